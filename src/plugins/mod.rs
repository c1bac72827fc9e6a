pub mod command_signer;
pub mod file_transport;
pub mod http_transport;
pub mod plugin_loader;

pub use command_signer::CommandSigningBackend;
pub use file_transport::FileTransport;
pub use http_transport::HttpTransport;
pub use plugin_loader::PluginLoader;
