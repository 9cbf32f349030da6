//! Contact classification for inbound chats.

/// Reply sent to a number that is not in the bot's address book.
pub const UNSAVED_CONTACT_GREETING: &str = "Greetings! Please confirm whether you are an existing \
student/graduate from Texila American University. If yes, share your application number.";

/// Shortest digit run treated as a phone number.
pub const MIN_PHONE_DIGITS: usize = 10;

/// True when the display name is a bare phone number, i.e. the contact has
/// not been saved under a name.
///
/// `+`, spaces and `-` are ignored; the rest must be at least ten digits.
pub fn is_unsaved_contact(display_name: &str) -> bool {
    let cleaned: String = display_name
        .chars()
        .filter(|c| !matches!(c, '+' | ' ' | '-'))
        .collect();
    cleaned.len() >= MIN_PHONE_DIGITS && cleaned.chars().all(|c| c.is_ascii_digit())
}

/// Number to log for a contact: the digits of the display name, or the name
/// itself when it has none.
pub fn contact_number(display_name: &str) -> String {
    let digits: String = display_name.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        display_name.trim().to_string()
    } else {
        digits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_numbers_are_unsaved() {
        assert!(is_unsaved_contact("+91 73977 35325"));
        assert!(is_unsaved_contact("592-555-0199-12"));
        assert!(is_unsaved_contact("15551234567"));
    }

    #[test]
    fn test_names_are_saved() {
        assert!(!is_unsaved_contact("Jamie Rivera"));
        assert!(!is_unsaved_contact("Jamie 5551234567"));
        assert!(!is_unsaved_contact(""));
    }

    #[test]
    fn test_short_numbers_are_saved() {
        assert!(!is_unsaved_contact("12345"));
        assert!(!is_unsaved_contact("+1 555 0199"));
    }

    #[test]
    fn test_contact_number() {
        assert_eq!(contact_number("+91 73977-35325"), "917397735325");
        assert_eq!(contact_number(" Jamie "), "Jamie");
    }

    #[test]
    fn test_greeting_text() {
        assert!(UNSAVED_CONTACT_GREETING.starts_with("Greetings! Please confirm"));
        assert!(UNSAVED_CONTACT_GREETING.contains("student/graduate from Texila"));
        assert!(UNSAVED_CONTACT_GREETING.ends_with("share your application number."));
    }
}
