mod config;
mod digest;
mod layout;
mod paths;
mod publisher;
mod store;

pub use config::{default_store_root, website_root_from_env, STORE_ROOT_VAR, WEBSITE_ROOT_VAR};
pub use digest::{sha256_hex, sha256_hex_file};
pub use layout::StoreLayout;
pub use paths::{is_contained, resolve_uri};
pub use publisher::Publisher;
pub use store::TransactionStore;
