const fn release_or_cargo_version(opt: Option<&'static str>) -> &'static str {
    match opt {
        Some(val) => val,
        None => env!("CARGO_PKG_VERSION"),
    }
}

pub const VERSION: &str = release_or_cargo_version(option_env!("VPS_BOT_VERSION"));

/// Discord rejects REST calls without a `DiscordBot (url, version)` user agent.
pub const USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/dpworld/vps-deployer, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);
