//! Remote service traits with in-memory and HTTP implementations.

pub mod http;
pub mod order;
pub mod product;
pub mod wallet;

pub use http::{HttpOrderService, HttpProductCatalog, HttpWalletService, RemoteClient};
pub use order::{InMemoryOrderService, OrderService};
pub use product::{InMemoryProductCatalog, ProductCatalog};
pub use wallet::{InMemoryWalletService, WalletService};
