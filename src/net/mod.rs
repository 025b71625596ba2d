pub mod connectivity;
pub mod cookies;
pub mod download;
pub mod fetch;
pub mod policy;
