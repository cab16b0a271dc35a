//! Input validators for the booking surfaces.
//!
//! Messages mirror the inline texts shown next to the form fields.

use crate::{CoreError, CoreResult};
use chrono::{Datelike, Utc};

fn invalid(message: &str) -> CoreError {
    CoreError::ValidationError(message.to_string())
}

/// Normalize and validate a phone number in international format.
///
/// Spaces, dashes and parentheses are stripped first. The number may carry a
/// leading `+`, must start with a non-zero digit and hold 2 to 15 digits.
/// Numbers with the `+91` prefix must be exactly 13 characters long, i.e.
/// ten digits after the country code.
pub fn phone(raw: &str) -> CoreResult<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);

    let well_formed = !digits.starts_with('0')
        && (2..=15).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit());
    if !well_formed {
        return Err(invalid("Please enter a valid phone number"));
    }
    if cleaned.starts_with("+91") && cleaned.len() != 13 {
        return Err(invalid("Please enter a valid phone number"));
    }
    Ok(cleaned)
}

/// OTP codes are exactly six digits.
pub fn otp_code(code: &str) -> CoreResult<()> {
    if code.len() == 6 && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(invalid("Please enter a valid 6-digit OTP"))
    }
}

pub fn email(raw: &str) -> CoreResult<()> {
    let value = raw.trim();
    let well_formed = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !value.contains(char::is_whitespace)
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|part| !part.is_empty())
        }
        None => false,
    };
    if well_formed {
        Ok(())
    } else {
        Err(invalid("Please enter a valid email address"))
    }
}

/// Validate a 16-digit card number with the Luhn checksum.
///
/// Returns the number with display spacing removed.
pub fn card_number(raw: &str) -> CoreResult<String> {
    let digits: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let well_formed =
        digits.len() == 16 && digits.chars().all(|c| c.is_ascii_digit()) && luhn(&digits);
    if well_formed {
        Ok(digits)
    } else {
        Err(invalid("Please enter a valid 16-digit card number"))
    }
}

/// Luhn checksum: double every second digit from the right, subtracting nine
/// from anything above nine, and require the sum to be divisible by ten.
fn luhn(digits: &str) -> bool {
    let mut sum = 0u32;
    for (index, c) in digits.chars().rev().enumerate() {
        let mut digit = c.to_digit(10).unwrap_or(0);
        if index % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    sum % 10 == 0
}

/// Validate "MM/YY" card expiry against the current month.
pub fn card_expiry(raw: &str) -> CoreResult<()> {
    let malformed = || invalid("Please enter a valid expiry date (MM/YY)");
    let (month_part, year_part) = raw.trim().split_once('/').ok_or_else(malformed)?;
    let month: u32 = month_part.trim().parse().map_err(|_| malformed())?;
    let year_part = year_part.trim();
    if year_part.len() != 2 {
        return Err(malformed());
    }
    let year: u32 = year_part.parse().map_err(|_| malformed())?;

    if !(1..=12).contains(&month) {
        return Err(malformed());
    }
    let now = Utc::now();
    let current_year = now.year() as u32 % 100;
    if year < current_year || (year == current_year && month < now.month()) {
        return Err(malformed());
    }
    Ok(())
}

/// CVV codes are three or four digits.
pub fn cvv(raw: &str) -> CoreResult<()> {
    if (3..=4).contains(&raw.len()) && raw.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(invalid("Please enter a valid CVV"))
    }
}

/// UPI virtual payment addresses look like `name@bank`.
pub fn upi_vpa(raw: &str) -> CoreResult<()> {
    let well_formed = match raw.split_once('@') {
        Some((name, bank)) => {
            !name.is_empty()
                && !bank.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
                && bank.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    };
    if well_formed {
        Ok(())
    } else {
        Err(invalid("Please enter a valid UPI ID"))
    }
}
