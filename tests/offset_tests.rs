use entitystore::{PersistenceManager, Predicate, SortKey, StoreError, User};

fn seeded(count: i64) -> PersistenceManager {
    let manager = PersistenceManager::in_memory("Chat");
    manager.initialize().unwrap();
    for i in 1..=count {
        manager
            .create(|u: &mut User| {
                u.user_id = i;
                u.name = format!("user{}", i);
                u.update_time = i * 100;
            })
            .unwrap();
    }
    manager
}

fn ids(users: &[User]) -> Vec<i64> {
    users.iter().map(|u| u.user_id).collect()
}

#[test]
fn test_limit_offset() {
    let manager = seeded(5);
    let page: Vec<User> = manager
        .fetch_page(1, 2, None, &[SortKey::ascending("user_id")])
        .unwrap();
    assert_eq!(ids(&page), vec![2, 3]);
}

#[test]
fn test_pages_cover_sorted_sequence() {
    let manager = seeded(7);
    let sorts = [SortKey::descending("update_time")];
    let full: Vec<User> = manager.fetch(None, &sorts).unwrap();

    let mut paged = Vec::new();
    let mut offset = 0;
    loop {
        let page: Vec<User> = manager.fetch_page(offset, 3, None, &sorts).unwrap();
        if page.is_empty() {
            break;
        }
        assert!(page.len() <= 3);
        offset += page.len();
        paged.extend(page);
    }
    assert_eq!(paged, full);
    assert_eq!(ids(&full), vec![7, 6, 5, 4, 3, 2, 1]);
}

#[test]
fn test_last_page_is_short() {
    let manager = seeded(5);
    let page: Vec<User> = manager
        .fetch_page(3, 20, None, &[SortKey::ascending("user_id")])
        .unwrap();
    assert_eq!(ids(&page), vec![4, 5]);
}

#[test]
fn test_offset_at_end_is_empty() {
    let manager = seeded(5);
    let page: Vec<User> = manager.fetch_page(5, 2, None, &[]).unwrap();
    assert!(page.is_empty());
    let page: Vec<User> = manager.fetch_page(50, 2, None, &[]).unwrap();
    assert!(page.is_empty());
}

#[test]
fn test_page_after_filter() {
    let manager = seeded(10);
    let even = Predicate::is_in("user_id", [2, 4, 6, 8, 10]);
    let page: Vec<User> = manager
        .fetch_page(1, 2, Some(&even), &[SortKey::ascending("user_id")])
        .unwrap();
    assert_eq!(ids(&page), vec![4, 6]);
}

#[test]
fn test_zero_limit_is_rejected() {
    let manager = seeded(1);
    let err = manager.fetch_page::<User>(0, 0, None, &[]).unwrap_err();
    assert!(matches!(err, StoreError::InvalidQuery(_)));
}
