//! Counter key construction.
//!
//! Keys encode subject, scope and purpose: `<subject>:<id>:<scope>[:<period>]`.

pub const MAGIC_LINK_GLOBAL: &str = "global:magic_link:hour";

/// Lower-cases an address so differently-cased spellings share one counter.
pub fn normalize_email(email: &str) -> String {
    email.to_lowercase()
}

pub fn magic_link_ip(ip: &str) -> String {
    format!("ip:{ip}:magic_link")
}

pub fn magic_link_email_hour(email: &str) -> String {
    format!("email:{}:magic_link:hour", normalize_email(email))
}

pub fn magic_link_email_cooldown(email: &str) -> String {
    format!("email:{}:magic_link:cooldown", normalize_email(email))
}

pub fn message_ip(ip: &str) -> String {
    format!("ip:{ip}:messages")
}

pub fn message_user_cooldown(user_id: &str) -> String {
    format!("user:{user_id}:messages:cooldown")
}

pub fn message_user_today(user_id: &str) -> String {
    format!("user:{user_id}:messages:today")
}
