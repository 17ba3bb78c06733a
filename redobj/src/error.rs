use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("row decode error: {0}")]
    RowDecode(#[from] bincode::error::DecodeError),

    #[error("row encode error: {0}")]
    RowEncode(#[from] bincode::error::EncodeError),

    #[error("serde error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Trying to modify database while in read transaction")]
    WrongTransactionState,

    #[error("{0}")]
    QueryMisuse(&'static str),

    #[error("Accessed object is no longer valid")]
    InvalidatedObject,

    #[error("Invalid objects cannot be thawed.")]
    ThawInvalidated,

    #[error("Notifications are not available on frozen collections since they do not change.")]
    FrozenNotifications,

    #[error("Can't perform transactions on a frozen Realm")]
    FrozenWrite,

    #[error("Attempting to create an object of type '{0}' with an existing primary key value")]
    DuplicatePrimaryKey(&'static str),

    #[error("Index {index} is out of bounds (size {size})")]
    OutOfBounds { index: usize, size: usize },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Unexpected null value in column '{0}'")]
    UnexpectedNull(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Asymmetric objects cannot be queried or observed")]
    Asymmetric,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        DbError::Custom(format!("Poison error: {:?}", e.to_string()))
    }
}
