//! Shared test utilities for the highlight store
//!
//! - `TestDatabase`: pgvector-enabled PostgreSQL container, migrated, with automatic cleanup
//! - `TestDataBuilder`: deterministic ids and embeddings with controllable distances
//!
//! ```rust,no_run
//! use test_utils::{TestDatabase, TestDataBuilder};
//!
//! #[tokio::test]
//! async fn my_postgres_test() {
//!     let db = TestDatabase::new().await;
//!     let builder = TestDataBuilder::from_test_name("my_test");
//!
//!     let id = builder.id(1);
//!     let near = TestDataBuilder::embedding(3072, 0.1);
//! }
//! ```

mod postgres;

pub use postgres::TestDatabase;

/// Builder for test data with deterministic values
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_upsert");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Stable highlight id, unique per (test, n)
    pub fn id(&self, n: u32) -> i64 {
        (self.seed % 1_000_000) as i64 * 1_000 + n as i64
    }

    /// Generate a unique name for testing
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("my_test");
    /// let name = builder.name("author", "main");
    /// assert!(name.starts_with("test-author-"));
    /// ```
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }

    /// Unit vector at `angle` radians from [`TestDataBuilder::query_embedding`].
    ///
    /// Its cosine distance to the query vector is `1 - cos(angle)`, so larger
    /// angles rank later.
    pub fn embedding(dimensions: usize, angle: f32) -> Vec<f32> {
        let mut vector = vec![0.0; dimensions];
        vector[0] = angle.cos();
        vector[1] = angle.sin();
        vector
    }

    /// The reference direction `[1, 0, 0, ...]`
    pub fn query_embedding(dimensions: usize) -> Vec<f32> {
        Self::embedding(dimensions, 0.0)
    }
}
