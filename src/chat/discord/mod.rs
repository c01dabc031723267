//! Discord gateway v10 and REST client.

pub mod events;
pub mod gateway;
pub mod rest;

pub use gateway::Gateway;
pub use rest::DiscordRest;

pub const API_BASE: &str = "https://discord.com/api/v10";
pub const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

const GUILDS: u64 = 1 << 0;
const GUILD_MEMBERS: u64 = 1 << 1;
const GUILD_MESSAGES: u64 = 1 << 9;
const DIRECT_MESSAGES: u64 = 1 << 12;
const MESSAGE_CONTENT: u64 = 1 << 15;

pub const INTENTS: u64 = GUILDS | GUILD_MEMBERS | GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT;
