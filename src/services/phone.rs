//! Phone display helpers
//!
//! Only used to build contact links. Duplicate detection compares the stored
//! strings as entered.

use crate::types::ContactLinks;

/// Strip separators, keeping a leading `+`. `None` when no digits remain.
pub fn normalize_phone(phone: &str) -> Option<String> {
    let trimmed = phone.trim();
    let plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    Some(if plus { format!("+{}", digits) } else { digits })
}

/// `tel:` and WhatsApp links for a stored phone number
pub fn contact_links(phone: &str) -> Option<ContactLinks> {
    let normalized = normalize_phone(phone)?;
    let international = match normalized.strip_prefix('+') {
        Some(rest) => rest,
        None => normalized.strip_prefix("00").unwrap_or(&normalized),
    };
    Some(ContactLinks {
        tel: format!("tel:{}", normalized),
        whatsapp: format!("https://wa.me/{}", international),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_separators() {
        assert_eq!(normalize_phone(" (082) 123-4567 ").as_deref(), Some("0821234567"));
        assert_eq!(normalize_phone("+27 82 123 4567").as_deref(), Some("+27821234567"));
        assert_eq!(normalize_phone("n/a"), None);
    }

    #[test]
    fn test_contact_links() {
        let links = contact_links("+27 82 123 4567").unwrap();
        assert_eq!(links.tel, "tel:+27821234567");
        assert_eq!(links.whatsapp, "https://wa.me/27821234567");

        let links = contact_links("0027821234567").unwrap();
        assert_eq!(links.whatsapp, "https://wa.me/27821234567");

        assert!(contact_links("   ").is_none());
    }
}
