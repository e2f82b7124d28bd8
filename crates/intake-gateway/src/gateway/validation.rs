use email_address::{EmailAddress, Options};

use super::domain::{Submission, SubmissionForm};

/// User-correctable input problems, all reported as `400 Bad Request`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required fields")]
    MissingFields,
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Prompt is required")]
    MissingPrompt,
    #[error("Request body must be a JSON object: {0}")]
    MalformedBody(String),
}

/// Check presence and email syntax, then escape the free-text fields.
///
/// Presence is checked for all three fields before the email format so that a
/// partially filled form reports a single aggregate failure.
pub fn validate_submission(form: SubmissionForm) -> Result<Submission, ValidationError> {
    let SubmissionForm {
        name,
        email,
        message,
    } = form;

    let (Some(name), Some(email), Some(message)) =
        (present(name), present(email), present(message))
    else {
        return Err(ValidationError::MissingFields);
    };

    let email = parse_email(&email)?;
    Ok(Submission::new(
        escape_html(&name),
        email,
        escape_html(&message),
    ))
}

/// Validate a chatbot prompt, returning the trimmed text.
pub fn validate_prompt(prompt: Option<String>) -> Result<String, ValidationError> {
    present(prompt).ok_or(ValidationError::MissingPrompt)
}

/// Parse a bare `local@domain` address, returning only the address part.
///
/// Display names (`Ada <ada@example.org>`) and domain literals are refused, so
/// nothing but the mailbox itself reaches the store or the mail provider.
pub fn parse_email(raw: &str) -> Result<String, ValidationError> {
    let options = Options::default()
        .without_display_text()
        .without_domain_literal();
    EmailAddress::parse_with_options(raw.trim(), options)
        .map(|address| address.email())
        .map_err(|_| ValidationError::InvalidEmail)
}

pub(crate) fn present(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

/// Escape the characters HTML treats as markup.
pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str, email: &str, message: &str) -> SubmissionForm {
        SubmissionForm {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            message: Some(message.to_string()),
        }
    }

    #[test]
    fn rejects_each_empty_field() {
        for candidate in [
            form("", "ada@example.org", "hello"),
            form("Ada", "", "hello"),
            form("Ada", "ada@example.org", "   "),
            SubmissionForm::default(),
        ] {
            assert_eq!(
                validate_submission(candidate),
                Err(ValidationError::MissingFields)
            );
        }
    }

    #[test]
    fn missing_fields_take_precedence_over_bad_email() {
        assert_eq!(
            validate_submission(form("", "not-an-email", "hello")),
            Err(ValidationError::MissingFields)
        );
    }

    #[test]
    fn rejects_malformed_email() {
        for email in ["not-an-email", "ada@", "@example.org", "ada example@org.com"] {
            assert_eq!(
                validate_submission(form("Ada", email, "hello")),
                Err(ValidationError::InvalidEmail),
                "{email} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_display_names_and_domain_literals() {
        for email in [
            "Ada <ada@example.org>",
            "<script>x</script> <ada@example.org>",
            "ada@[127.0.0.1]",
        ] {
            assert_eq!(
                validate_submission(form("Ada", email, "hello")),
                Err(ValidationError::InvalidEmail),
                "{email} should be rejected"
            );
            assert_eq!(parse_email(email), Err(ValidationError::InvalidEmail));
        }
    }

    #[test]
    fn escapes_markup_in_free_text() {
        let submission = validate_submission(form(
            "<script>",
            " ada@example.org ",
            "Tom & Jerry's \"show\"",
        ))
        .expect("valid submission");

        assert_eq!(submission.name(), "&lt;script&gt;");
        assert_eq!(submission.email(), "ada@example.org");
        assert_eq!(
            submission.message(),
            "Tom &amp; Jerry&#39;s &quot;show&quot;"
        );
    }

    #[test]
    fn prompt_must_contain_text() {
        assert_eq!(validate_prompt(None), Err(ValidationError::MissingPrompt));
        assert_eq!(
            validate_prompt(Some(" \n".to_string())),
            Err(ValidationError::MissingPrompt)
        );
        assert_eq!(
            validate_prompt(Some(" How can I donate? ".to_string())),
            Ok("How can I donate?".to_string())
        );
    }
}
