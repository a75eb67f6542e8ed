pub mod cache;
pub mod config;
pub mod exception;
pub mod form;
pub mod handler;
pub mod param;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod store;

pub use cache::PhotoCache;
pub use config::{CliArgs, Config};
pub use exception::Exception;
pub use handler::App;
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion};
pub use request::Request;
pub use response::Response;
pub use router::Router;
pub use server::Service;
pub use store::{Item, ItemPatch, ItemStore, ItemView};
