use payloads::ErrorKind;

/// Internal engine error. Carries the caller-visible `ErrorKind` plus a
/// human-readable detail; the api crate maps this straight onto its HTTP
/// error type the same way `StoreError` maps onto `APIError`.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct EngineError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl EngineError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

macro_rules! error_kind_ctor {
    ($name:ident, $kind:ident) => {
        pub fn $name(detail: impl Into<String>) -> EngineError {
            EngineError::new(ErrorKind::$kind, detail)
        }
    };
}

error_kind_ctor!(wrong_state, WrongState);
error_kind_ctor!(not_owner, NotOwner);
error_kind_ctor!(not_active_player, NotActivePlayer);
error_kind_ctor!(self_outbid, SelfOutbid);
error_kind_ctor!(amount_too_low, AmountTooLow);
error_kind_ctor!(insufficient_balance, InsufficientBalance);
error_kind_ctor!(nothing_to_undo, NothingToUndo);
error_kind_ctor!(empty_catalog, EmptyCatalog);
error_kind_ctor!(cancelled, Cancelled);
error_kind_ctor!(persistence_error, PersistenceError);
error_kind_ctor!(unknown_auction, UnknownAuction);
error_kind_ctor!(unknown_player, UnknownPlayer);
error_kind_ctor!(unknown_manager, UnknownManager);

pub type EngineResult<T> = Result<T, EngineError>;
