/// Checkout form details. Validated for shape only; nothing is charged.
use crate::error::FieldError;
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub card_name: String,
    pub card_number: String,
    /// MM/YY
    pub expiration_date: String,
    pub cvv: String,
    pub address: String,
    pub zip_code: String,
    /// Where the confirmation goes; empty means the account email
    #[serde(default)]
    pub recipient_email: String,
}

impl PaymentDetails {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        self.validate_at(Utc::now().date_naive())
    }

    /// Validate against a given calendar date (expiry must be a later month)
    pub fn validate_at(&self, today: NaiveDate) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.card_name.trim().is_empty() {
            errors.push(FieldError::new("cardName", "Cardholder name is required"));
        }

        if self.card_number.trim().is_empty() {
            errors.push(FieldError::new("cardNumber", "Card number is required"));
        } else if !is_valid_card_number(&self.card_number) {
            errors.push(FieldError::new("cardNumber", "Please enter a valid card number"));
        }

        if self.expiration_date.trim().is_empty() {
            errors.push(FieldError::new("expirationDate", "Expiration date is required"));
        } else if !is_valid_expiry(&self.expiration_date, today) {
            errors.push(FieldError::new(
                "expirationDate",
                "Please enter a valid expiration date (MM/YY)",
            ));
        }

        if self.cvv.trim().is_empty() {
            errors.push(FieldError::new("cvv", "CVV is required"));
        } else if !all_digits(&self.cvv, 3, 4) {
            errors.push(FieldError::new("cvv", "Please enter a valid CVV (3-4 digits)"));
        }

        if self.address.trim().is_empty() {
            errors.push(FieldError::new("address", "Address is required"));
        }

        if self.zip_code.trim().is_empty() {
            errors.push(FieldError::new("zipCode", "Zip code is required"));
        } else if !all_digits(&self.zip_code, 5, 10) {
            errors.push(FieldError::new("zipCode", "Please enter a valid zip code"));
        }

        if !self.recipient_email.trim().is_empty() && !is_valid_email(&self.recipient_email) {
            errors.push(FieldError::new("recipientEmail", "Please enter a valid email address"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Recipient for the confirmation email
    pub fn recipient_or<'a>(&'a self, account_email: &'a str) -> &'a str {
        match self.recipient_email.trim() {
            "" => account_email,
            email => email,
        }
    }
}

fn all_digits(value: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&value.len()) && value.bytes().all(|b| b.is_ascii_digit())
}

fn is_valid_card_number(value: &str) -> bool {
    let cleaned: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    all_digits(&cleaned, 13, 19)
}

fn is_valid_expiry(value: &str, today: NaiveDate) -> bool {
    let (month, year) = match value.split_once('/') {
        Some((m, y)) if all_digits(m, 2, 2) && all_digits(y, 2, 2) => (m, y),
        _ => return false,
    };
    let (month, year) = match (month.parse::<u32>(), year.parse::<i32>()) {
        (Ok(m), Ok(y)) if (1..=12).contains(&m) => (m, 2000 + y),
        _ => return false,
    };

    (year, month) > (today.year(), today.month())
}

/// Whitespace-free local part, one `@`, and a dot in the domain
pub fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.contains('@') => {
            match domain.rsplit_once('.') {
                Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
                None => false,
            }
        }
        _ => false,
    }
}

/// Digits only, grouped by four: "4111111111111111" -> "4111 1111 1111 1111"
pub fn format_card_number(value: &str) -> String {
    let digits: Vec<char> = value.chars().filter(|c| c.is_ascii_digit()).collect();
    digits
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}
