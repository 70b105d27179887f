//! Submission validation.
//!
//! Pure, side-effect-free checks. The landing page runs the same rules for
//! UX; only this server-side pass is trusted.

use std::fmt;

use serde::Serialize;

use crate::{config::ValidationConfig, contact::Submission};

pub const MAX_EMAIL_LEN: usize = 254;

/// The submitted field a validation message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
  Email,
  ZipCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
  pub field:   Field,
  pub message: String,
}

/// Every field-level problem with a submission, in form order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = &FieldError> { self.0.iter() }

  /// The message shown to the user: the first problem found.
  pub fn first_message(&self) -> Option<&str> { self.0.first().map(|e| e.message.as_str()) }

  pub fn get(&self, field: Field) -> Option<&str> {
    self.0.iter().find(|e| e.field == field).map(|e| e.message.as_str())
  }

  fn push(&mut self, field: Field, message: impl Into<String>) {
    self.0.push(FieldError { field, message: message.into() });
  }
}

impl fmt::Display for FieldErrors {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.first_message().unwrap_or("invalid submission"))
  }
}

/// Trim and lowercase an address.
pub fn normalize_email(raw: &str) -> String { raw.trim().to_lowercase() }

/// True when the hidden honeypot field was filled in.
pub fn is_bot(submission: &Submission) -> bool {
  submission
    .website
    .as_deref()
    .is_some_and(|w| !w.trim().is_empty())
}

pub fn validate(submission: &Submission, config: &ValidationConfig) -> Result<(), FieldErrors> {
  let mut errors = FieldErrors::default();

  if let Err(msg) = check_email(&normalize_email(&submission.email), config) {
    errors.push(Field::Email, msg);
  }
  if let Err(msg) = check_postal_code(submission.zip_code.trim(), config.postal_code_digits) {
    errors.push(Field::ZipCode, msg);
  }

  if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn check_email(email: &str, config: &ValidationConfig) -> Result<(), String> {
  if email.is_empty() {
    return Err("Email is required".into());
  }
  if email.len() > MAX_EMAIL_LEN {
    return Err("Email is too long".into());
  }
  if !has_email_shape(email) {
    return Err("Invalid email format".into());
  }
  let domain = email.split('@').nth(1).unwrap_or_default();
  if config.is_disposable(domain) {
    return Err("Please use a permanent email address".into());
  }
  Ok(())
}

/// `local@domain.tld`: exactly one `@`, no whitespace, and a dot in the
/// domain with something on both sides of it.
fn has_email_shape(email: &str) -> bool {
  if email.chars().any(char::is_whitespace) {
    return false;
  }
  let Some((local, domain)) = email.split_once('@') else {
    return false;
  };
  if local.is_empty() || domain.contains('@') {
    return false;
  }
  domain
    .char_indices()
    .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

fn check_postal_code(code: &str, digits: usize) -> Result<(), String> {
  if code.is_empty() {
    return Err("ZIP code is required".into());
  }
  if code.len() != digits || !code.bytes().all(|b| b.is_ascii_digit()) {
    return Err(format!("ZIP code must be {digits} digits"));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn submission(email: &str, zip: &str) -> Submission {
    Submission { email: email.into(), zip_code: zip.into(), ..Default::default() }
  }

  fn check(email: &str, zip: &str) -> Result<(), FieldErrors> {
    validate(&submission(email, zip), &ValidationConfig::default())
  }

  #[test]
  fn accepts_ordinary_submission() {
    assert!(check("Jane.Doe@Example.com", "02139").is_ok());
  }

  #[test]
  fn email_shapes() {
    assert!(has_email_shape("a@b.co"));
    assert!(has_email_shape("a.b+c@sub.domain.org"));
    assert!(!has_email_shape("ab.co"));
    assert!(!has_email_shape("@b.co"));
    assert!(!has_email_shape("a@b"));
    assert!(!has_email_shape("a@.co"));
    assert!(!has_email_shape("a@b."));
    assert!(!has_email_shape("a@@b.co"));
    assert!(!has_email_shape("a b@c.co"));
  }

  #[test]
  fn missing_fields_are_reported_together() {
    let errors = check("", "").unwrap_err();
    assert_eq!(errors.get(Field::Email), Some("Email is required"));
    assert_eq!(errors.get(Field::ZipCode), Some("ZIP code is required"));
    assert_eq!(errors.first_message(), Some("Email is required"));
  }

  #[test]
  fn email_length_limit() {
    let long = format!("{}@example.com", "a".repeat(MAX_EMAIL_LEN));
    assert_eq!(check(&long, "12345").unwrap_err().get(Field::Email), Some("Email is too long"));
  }

  #[test]
  fn disposable_domains_rejected() {
    let errors = check("someone@Mailinator.com", "12345").unwrap_err();
    assert_eq!(errors.get(Field::Email), Some("Please use a permanent email address"));
  }

  #[test]
  fn postal_code_must_be_exact_digits() {
    for zip in ["1234", "123456", "1234a", "１２３４５"] {
      let errors = check("a@b.co", zip).unwrap_err();
      assert_eq!(errors.get(Field::ZipCode), Some("ZIP code must be 5 digits"), "zip {zip:?}");
    }
  }

  #[test]
  fn postal_code_digits_are_configurable() {
    let config = ValidationConfig { postal_code_digits: 4, ..Default::default() };
    assert!(validate(&submission("a@b.co", "1234"), &config).is_ok());
    assert!(validate(&submission("a@b.co", "12345"), &config).is_err());
  }

  #[test]
  fn honeypot() {
    let mut s = submission("a@b.co", "12345");
    assert!(!is_bot(&s));
    s.website = Some("   ".into());
    assert!(!is_bot(&s));
    s.website = Some("http://spam.example".into());
    assert!(is_bot(&s));
  }
}
