use uuid::Uuid;

const RANDOM_ID_LEN: usize = 8;

/// Source of fresh opaque identifiers. The store retries on collision, so an
/// implementation only has to make repeats unlikely.
pub trait IdGenerator {
    fn generate(&mut self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn generate(&mut self) -> String {
        let mut raw = Uuid::new_v4().simple().to_string();
        raw.truncate(RANDOM_ID_LEN);
        raw
    }
}

/// Deterministic ids `prefix1`, `prefix2`, ...
#[derive(Debug, Clone)]
pub struct SequentialIds {
    prefix: String,
    next: u64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }
}

impl IdGenerator for SequentialIds {
    fn generate(&mut self) -> String {
        let id = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        id
    }
}
