use super::{Cli, Command};
use anyhow::{Context, Result, bail};
use entitystore::{PersistenceManager, Predicate, SortKey, UpdateOutcome, User};
use uuid::Uuid;

pub fn run(cli: Cli) -> Result<()> {
    let config = cli.store_config()?;
    let manager = PersistenceManager::open(config).context("failed to open store")?;

    match cli.command {
        Command::Add { id, name } => add(&manager, id, name),
        Command::Delete { id } => delete(&manager, id),
        Command::Update { id, msg } => update(&manager, id, msg),
        Command::List { offset, limit } => list(&manager, offset, limit),
        Command::Query { filter } => query(&manager, &filter),
    }
}

fn add(manager: &PersistenceManager, id: Option<i64>, name: Option<String>) -> Result<()> {
    let user_id = id.unwrap_or_else(random_user_id);
    let name = name.unwrap_or_else(|| random_string(5));
    let user = manager
        .create(|user: &mut User| {
            user.user_id = user_id;
            user.name = name;
            user.last_msg = String::new();
            user.update_time = now();
        })
        .context("failed to add user")?;
    println!("added {}", describe(&user));
    Ok(())
}

fn delete(manager: &PersistenceManager, id: i64) -> Result<()> {
    let deleted = manager
        .delete::<User>(Some(&Predicate::eq("user_id", id)))
        .context("failed to delete user")?;
    println!("deleted {} user(s)", deleted);
    Ok(())
}

fn update(manager: &PersistenceManager, id: i64, msg: Option<String>) -> Result<()> {
    let msg = msg.unwrap_or_else(|| random_string(5));
    let outcome = manager
        .update(Some(&Predicate::eq("user_id", id)), |user: &mut User| {
            user.last_msg = msg;
            user.update_time = now();
        })
        .context("failed to update user")?;
    match outcome {
        UpdateOutcome::Updated => println!("updated user {}", id),
        UpdateOutcome::Unchanged => println!("user {} unchanged", id),
        UpdateOutcome::NotFound => bail!("no user with id {}", id),
    }
    Ok(())
}

fn list(manager: &PersistenceManager, offset: usize, limit: usize) -> Result<()> {
    let users: Vec<User> = manager
        .fetch_page(offset, limit, None, &[SortKey::descending("update_time")])
        .context("failed to list users")?;
    print_users(&users);
    Ok(())
}

fn query(manager: &PersistenceManager, filter: &str) -> Result<()> {
    let predicate = Predicate::parse(filter).with_context(|| format!("invalid filter '{}'", filter))?;
    let users: Vec<User> = manager
        .fetch(Some(&predicate), &[SortKey::descending("update_time")])
        .context("query failed")?;
    print_users(&users);
    Ok(())
}

fn print_users(users: &[User]) {
    if users.is_empty() {
        println!("(no users)");
        return;
    }
    for user in users {
        println!("{}", describe(user));
    }
}

fn describe(user: &User) -> String {
    format!("{} {} {}", user.name, user.user_id, user.last_msg)
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Five digit id, like the ids handed out by the list screen.
fn random_user_id() -> i64 {
    10_000 + (Uuid::new_v4().as_u128() % 90_000) as i64
}

fn random_string(len: usize) -> String {
    Uuid::new_v4().simple().to_string().chars().take(len).collect()
}
