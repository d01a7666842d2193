pub use artifact_relay_core::{classifier, config, contract, rewrite};
