//! Value format checks.
//!
//! Each check returns `Err(message)` describing what is wrong with the value.

use std::net::IpAddr;

pub const MAX_HOSTNAME_LEN: usize = 63;
pub const MAX_DOMAIN_LEN: usize = 255;

pub fn ip_address(value: &str) -> Result<(), String> {
    value
        .parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| format!("'{}' is not a valid IP address", value))
}

/// `address/prefix` with the prefix bounded by the address family.
pub fn cidr(value: &str) -> Result<(), String> {
    let Some((addr, prefix)) = value.split_once('/') else {
        return Err(format!("'{}' is not in CIDR notation (address/prefix)", value));
    };
    let addr: IpAddr = addr
        .parse()
        .map_err(|_| format!("'{}' has an invalid address part", value))?;
    let max_prefix = if addr.is_ipv4() { 32 } else { 128 };
    match prefix.parse::<u8>() {
        Ok(bits) if bits <= max_prefix => Ok(()),
        _ => Err(format!(
            "'{}' has an invalid prefix length (must be 0-{})",
            value, max_prefix
        )),
    }
}

pub fn ip_or_cidr(value: &str) -> Result<(), String> {
    if value.contains('/') {
        cidr(value)
    } else {
        ip_address(value)
    }
}

/// A port, a `low-high` range, or a comma list of either. Named services
/// (`http`, `ssh`) are accepted as-is.
pub fn port_spec(value: &str) -> Result<(), String> {
    for item in value.split(',') {
        let item = item.trim();
        if item.is_empty() {
            return Err(format!("'{}' contains an empty port entry", value));
        }
        if item.chars().all(|c| c.is_ascii_alphabetic() || c == '-') && !item.starts_with('-') {
            continue;
        }
        match item.split_once('-') {
            Some((low, high)) => {
                let low = port(low)?;
                let high = port(high)?;
                if low > high {
                    return Err(format!("port range '{}' is reversed", item));
                }
            }
            None => {
                port(item)?;
            }
        }
    }
    Ok(())
}

pub fn port(value: &str) -> Result<u16, String> {
    match value.trim().parse::<u32>() {
        Ok(p) if (1..=65535).contains(&p) => Ok(p as u16),
        Ok(p) => Err(format!("port {} out of range (must be 1-65535)", p)),
        Err(_) => Err(format!("'{}' is not a valid port number", value)),
    }
}

fn label(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("empty label".to_string());
    }
    if value.len() > MAX_HOSTNAME_LEN {
        return Err(format!(
            "label '{}' exceeds {} characters",
            value, MAX_HOSTNAME_LEN
        ));
    }
    if value.starts_with('-') || value.ends_with('-') {
        return Err(format!("label '{}' cannot start or end with '-'", value));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(format!("label '{}' contains invalid characters", value));
    }
    Ok(())
}

pub fn hostname(value: &str) -> Result<(), String> {
    if value.len() > MAX_HOSTNAME_LEN {
        return Err(format!(
            "host name exceeds {} characters ({})",
            MAX_HOSTNAME_LEN,
            value.len()
        ));
    }
    label(value)
}

pub fn domain_name(value: &str) -> Result<(), String> {
    if value.len() > MAX_DOMAIN_LEN {
        return Err(format!(
            "domain name exceeds {} characters ({})",
            MAX_DOMAIN_LEN,
            value.len()
        ));
    }
    value.trim_end_matches('.').split('.').try_for_each(label)
}

pub fn mac_address(value: &str) -> Result<(), String> {
    let octets: Vec<&str> = value.split(':').collect();
    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
    if valid {
        Ok(())
    } else {
        Err(format!("'{}' is not a valid MAC address", value))
    }
}

pub fn integer_in(value: &str, min: i64, max: i64) -> Result<(), String> {
    match value.parse::<i64>() {
        Ok(n) if (min..=max).contains(&n) => Ok(()),
        Ok(n) => Err(format!("{} out of range (must be {}-{})", n, min, max)),
        Err(_) => Err(format!("'{}' is not an integer", value)),
    }
}

pub fn one_of(value: &str, allowed: &[&str]) -> Result<(), String> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(format!(
            "'{}' is not one of: {}",
            value,
            allowed.join(", ")
        ))
    }
}
