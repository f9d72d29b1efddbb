//! Account number allocation

use rand::Rng;
use tracing::{debug, warn};

use super::store::StoreError;
use super::types::{AccountNumber, ACCOUNT_NUMBER_MAX, ACCOUNT_NUMBER_MIN};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 16;

/// Draws random 8-digit numbers and relies on the store's uniqueness check
/// to reject collisions, drawing again on each one.
#[derive(Debug, Clone, Copy)]
pub struct NumberAllocator {
    max_attempts: u32,
}

impl Default for NumberAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl NumberAllocator {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Uniform draw from `[ACCOUNT_NUMBER_MIN, ACCOUNT_NUMBER_MAX]`
    pub fn draw<R: Rng + ?Sized>(rng: &mut R) -> AccountNumber {
        rng.gen_range(ACCOUNT_NUMBER_MIN..=ACCOUNT_NUMBER_MAX)
    }

    /// Generate-then-insert. `insert` must return `StoreError::Duplicate`
    /// when the number is taken; any other result ends the loop.
    pub fn allocate<R, T, F>(&self, rng: &mut R, mut insert: F) -> Result<T, StoreError>
    where
        R: Rng + ?Sized,
        F: FnMut(AccountNumber) -> Result<T, StoreError>,
    {
        let mut last = ACCOUNT_NUMBER_MIN;
        for attempt in 1..=self.max_attempts {
            last = Self::draw(rng);
            match insert(last) {
                Err(StoreError::Duplicate(number)) => {
                    debug!(number, attempt, "account number collision, drawing again");
                }
                other => return other,
            }
        }
        warn!(attempts = self.max_attempts, "account number allocation exhausted");
        Err(StoreError::Duplicate(last))
    }
}
