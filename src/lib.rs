pub mod bot;
pub mod chat;
pub mod db;
pub mod docker;
pub mod notifications;
pub mod provisioning;
pub mod version;

#[cfg(test)]
mod testing;
