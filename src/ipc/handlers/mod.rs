pub mod comments;
pub mod core;
pub mod directory;
pub mod locks;
pub mod notices;
pub mod rota;
pub mod session;
