//! Facts about the local host used for routing and message composition.

use dns_lookup::{AddrInfoHints, getaddrinfo};

/// The short host name, or `localhost` if it cannot be determined
pub fn hostname() -> String {
    ::hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// The fully qualified host name, falling back to [`hostname`] when the
/// resolver does not know a canonical name.
pub fn fqdn() -> String {
    let host = hostname();
    let hints = AddrInfoHints {
        flags: libc::AI_CANONNAME,
        ..AddrInfoHints::default()
    };

    getaddrinfo(Some(host.as_str()), None, Some(hints))
        .ok()
        .and_then(|mut addrs| addrs.find_map(|addr| addr.ok().and_then(|addr| addr.canonname)))
        .filter(|name| !name.is_empty())
        .unwrap_or(host)
}

/// The domain used for locally generated sender addresses: the contents of
/// `/etc/mailname`, or the fully qualified host name.
pub fn mailname() -> String {
    std::fs::read_to_string("/etc/mailname")
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(fqdn)
}

/// Login name of the submitting user
pub fn username() -> String {
    ["LOGNAME", "USER"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|name| !name.is_empty()))
        .unwrap_or_else(|| {
            // SAFETY: getuid cannot fail.
            let uid = unsafe { libc::getuid() };
            uid.to_string()
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_is_not_empty() {
        assert!(!hostname().is_empty());
        assert!(!fqdn().is_empty());
    }
}
