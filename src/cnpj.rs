use std::fmt;

use thiserror::Error;

pub const CNPJ_LEN: usize = 14;

const FIRST_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const SECOND_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CnpjError {
    #[error("CNPJ deve conter 14 dígitos")]
    WrongLength,
    #[error("CNPJ inválido: todos os dígitos são iguais")]
    RepeatedDigit,
    #[error("CNPJ inválido: dígito verificador incorreto")]
    BadCheckDigit,
}

impl CnpjError {
        pub fn code(&self) -> &'static str {
        match self {
            CnpjError::WrongLength => "wrong_length",
            CnpjError::RepeatedDigit => "repeated_digit",
            CnpjError::BadCheckDigit => "bad_check_digit",
        }
    }
}

/// A checksum-valid CNPJ, only built by [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cnpj(String);

impl Cnpj {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `NN.NNN.NNN/NNNN-NN`
    pub fn formatted(&self) -> String {
        let d = &self.0;
        format!(
            "{}.{}.{}/{}-{}",
            &d[0..2],
            &d[2..5],
            &d[5..8],
            &d[8..12],
            &d[12..14]
        )
    }
}

impl fmt::Display for Cnpj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Cnpj {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Cnpj {
    type Err = CnpjError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate(s)
    }
}

pub fn clean(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Punctuate a CNPJ for display. Inputs that do not clean to 14 digits are
/// returned unchanged.
pub fn format(raw: &str) -> String {
    let digits = clean(raw);
    if digits.len() != CNPJ_LEN {
        return raw.to_string();
    }
    Cnpj(digits).formatted()
}

/// Clean `raw` and verify length, repeated digits and both check digits.
pub fn validate(raw: &str) -> Result<Cnpj, CnpjError> {
    let cleaned = clean(raw);
    if cleaned.len() != CNPJ_LEN {
        return Err(CnpjError::WrongLength);
    }

    let digits: Vec<u32> = cleaned.bytes().map(|b| u32::from(b - b'0')).collect();

    if digits.iter().all(|&d| d == digits[0]) {
        return Err(CnpjError::RepeatedDigit);
    }

    if check_digit(&digits[..12], &FIRST_WEIGHTS) != digits[12] {
        return Err(CnpjError::BadCheckDigit);
    }
    if check_digit(&digits[..13], &SECOND_WEIGHTS) != digits[13] {
        return Err(CnpjError::BadCheckDigit);
    }

    Ok(Cnpj(cleaned))
}

fn check_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    let digit = 11 - (sum % 11);
    if digit > 9 {
        0
    } else {
        digit
    }
}
