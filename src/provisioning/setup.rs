//! Shell scripts run inside a fresh container.

const APT_ENV: &str = "DEBIAN_FRONTEND=noninteractive";

/// Installs tmate, and the init system packages when requested.
pub fn install_packages_script(with_init_system: bool) -> String {
    let mut packages = vec!["tmate"];
    if with_init_system {
        packages.extend(["systemd-sysv", "dbus", "dbus-user-session"]);
    }
    format!(
        "{APT_ENV} apt-get update && {APT_ENV} apt-get install -y {}",
        packages.join(" ")
    )
}

/// Installs tmate only when it is missing, used when an existing VPS starts.
pub fn ensure_tmate_script() -> String {
    format!("command -v tmate >/dev/null 2>&1 || ({APT_ENV} apt-get update && {APT_ENV} apt-get install -y tmate)")
}

/// Kills any tmate left over from an earlier session.
pub const KILL_SESSIONS: &str = "pkill tmate || true";

pub const MEMORY_USAGE: &str = "free -m";

/// Creates the login account handed to the owner.
pub fn create_login_script(username: &str, password: &str) -> String {
    let user = quote(username);
    let credentials = quote(&format!("{username}:{password}"));
    format!(
        "id -u {user} >/dev/null 2>&1 || useradd -m -s /bin/bash {user}; echo {credentials} | chpasswd"
    )
}

/// Rewrites the system identity files so the container presents itself as
/// `brand`.
pub fn branding_script(brand: &str) -> String {
    let slug = brand_slug(brand);
    let name = brand.replace('"', "");
    let os_release = format!(
        "PRETTY_NAME=\"{name}\"\nNAME=\"{name}\"\nVERSION=\"1.0\"\nID={slug}\nVERSION_ID=\"1.0\"\n"
    );
    let lsb_release = format!(
        "DISTRIB_ID={slug}\nDISTRIB_RELEASE=1.0\nDISTRIB_CODENAME=vps\nDISTRIB_DESCRIPTION=\"{name}\"\n"
    );
    format!(
        "printf '%s\\n' {host} > /etc/hostname; printf '127.0.0.1 %s\\n' {host} >> /etc/hosts; printf '%s' {os} > /etc/os-release; printf '%s' {lsb} > /etc/lsb-release",
        host = quote(&slug),
        os = quote(&os_release),
        lsb = quote(&lsb_release),
    )
}

/// Lowercase alphanumerics of the brand, usable as a hostname and os id.
pub fn brand_slug(brand: &str) -> String {
    let slug: String = brand
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if slug.is_empty() { "vps".to_string() } else { slug }
}

/// Single-quotes `value` for a POSIX shell.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_script_packages() {
        assert!(install_packages_script(false).ends_with("apt-get install -y tmate"));
        assert!(install_packages_script(true).contains("tmate systemd-sysv dbus"));
    }

    #[test]
    fn test_quote_escapes_single_quotes() {
        assert_eq!(quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_branding_script_writes_identity_files() {
        let script = branding_script("CatHosting Vps");
        assert!(script.contains("> /etc/hostname"));
        assert!(script.contains("ID=cathostingvps"));
        assert!(script.contains(r#"PRETTY_NAME="CatHosting Vps""#));
        assert!(script.contains("> /etc/lsb-release"));
    }

    #[test]
    fn test_brand_slug_fallback() {
        assert_eq!(brand_slug("My VPS #1"), "myvps1");
        assert_eq!(brand_slug("!!!"), "vps");
    }

    #[test]
    fn test_login_script_quotes_credentials() {
        let script = create_login_script("alice", "p4ss");
        assert!(script.contains("useradd -m -s /bin/bash 'alice'"));
        assert!(script.contains("echo 'alice:p4ss' | chpasswd"));
    }
}
