mod auto_sync;

pub use auto_sync::try_auto_sync;
