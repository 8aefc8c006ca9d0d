use super::predicate::Predicate;
use super::sort::{SortKey, sort_records};
use crate::core::{EntitySchema, Record, Result, StoreError};

/// Offset/limit window over the filtered, sorted result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    offset: usize,
    limit: usize,
}

impl Page {
    /// A limit of zero is rejected; an offset past the end is allowed and
    /// yields an empty page.
    pub fn new(offset: usize, limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(StoreError::InvalidQuery(
                "Page limit must be greater than zero".into(),
            ));
        }
        Ok(Self { offset, limit })
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Declarative query handed to a storage engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub entity: String,
    pub predicate: Option<Predicate>,
    pub sort_keys: Vec<SortKey>,
    pub page: Option<Page>,
}

impl FetchRequest {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            predicate: None,
            sort_keys: Vec::new(),
            page: None,
        }
    }

    pub fn with_predicate(mut self, predicate: Option<Predicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn sorted_by(mut self, sort_keys: Vec<SortKey>) -> Self {
        self.sort_keys = sort_keys;
        self
    }

    pub fn paginated(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }

    /// Check the predicate and sort keys against the entity schema.
    pub fn validate(&self, schema: &EntitySchema) -> Result<()> {
        if schema.name() != self.entity {
            return Err(StoreError::SchemaMismatch(format!(
                "Request targets '{}' but schema is '{}'",
                self.entity,
                schema.name()
            )));
        }
        if let Some(predicate) = &self.predicate {
            predicate.validate(schema)?;
        }
        for key in &self.sort_keys {
            key.validate(schema)?;
        }
        Ok(())
    }

    /// Filter, sort and paginate records given in underlying storage order.
    pub fn execute<I>(&self, records: I) -> Result<Vec<Record>>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut matched = Vec::new();
        for record in records {
            let keep = match &self.predicate {
                Some(predicate) => predicate.matches(&record)?,
                None => true,
            };
            if keep {
                matched.push(record);
            }
        }

        sort_records(&mut matched, &self.sort_keys)?;

        Ok(match self.page {
            Some(page) => matched
                .into_iter()
                .skip(page.offset)
                .take(page.limit)
                .collect(),
            None => matched,
        })
    }
}
