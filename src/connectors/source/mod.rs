//! Source connector variants

pub mod database;
pub mod folder;
pub mod transfer;
pub mod url;

pub use database::DatabaseSource;
pub use folder::FolderSource;
pub use transfer::TransferSource;
pub use url::UrlSource;

use super::ConnectorRegistry;

/// Register every built-in source variant.
pub fn register_builtins(registry: &mut ConnectorRegistry) {
    registry.register_source(
        folder::VARIANT,
        Box::new(|_ctx, envelope| Ok(Box::new(FolderSource::from_envelope(envelope)?))),
    );
    registry.register_source(
        url::VARIANT,
        Box::new(|ctx, envelope| Ok(Box::new(UrlSource::from_envelope(ctx, envelope)?))),
    );
    registry.register_source(
        transfer::VARIANT,
        Box::new(|ctx, envelope| Ok(Box::new(TransferSource::from_envelope(ctx, envelope)?))),
    );
    registry.register_source(
        database::VARIANT,
        Box::new(|ctx, envelope| Ok(Box::new(DatabaseSource::from_envelope(ctx, envelope)?))),
    );
}
