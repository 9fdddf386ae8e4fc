#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] tandem_store::Error),

    #[error(transparent)]
    Accounts(#[from] tandem_accounts::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
