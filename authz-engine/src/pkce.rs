//! Proof Key for Code Exchange (RFC 7636)

use crate::error::OAuthError;
use crate::models::{CodeChallenge, CodeChallengeMethod};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const VERIFIER_MIN_LEN: usize = 43;
const VERIFIER_MAX_LEN: usize = 128;

/// Builds the challenge stored with an authorization code
pub fn code_challenge(
    challenge: Option<&str>,
    method: Option<&str>,
) -> Result<Option<CodeChallenge>, OAuthError> {
    match (challenge, method) {
        (None, None) => Ok(None),
        (None, Some(_)) => Err(OAuthError::invalid_request(
            "code_challenge_method without code_challenge",
        )),
        (Some(challenge), method) => {
            let method = method
                .map(str::parse::<CodeChallengeMethod>)
                .transpose()?
                .unwrap_or(CodeChallengeMethod::S256);
            if !is_valid_verifier_syntax(challenge) {
                return Err(OAuthError::invalid_request("malformed code_challenge"));
            }
            Ok(Some(CodeChallenge {
                challenge: challenge.to_string(),
                method,
            }))
        }
    }
}

/// Checks a `code_verifier` presented at the token endpoint against the
/// challenge recorded with the code.
pub fn verify(challenge: Option<&CodeChallenge>, verifier: Option<&str>) -> Result<(), OAuthError> {
    match (challenge, verifier) {
        (None, None) => Ok(()),
        (None, Some(_)) => Err(OAuthError::invalid_grant(
            "code_verifier sent for a code issued without a challenge",
        )),
        (Some(_), None) => Err(OAuthError::invalid_grant("code_verifier is required")),
        (Some(challenge), Some(verifier)) => {
            if !is_valid_verifier_syntax(verifier) {
                return Err(OAuthError::invalid_grant("malformed code_verifier"));
            }
            let derived = match challenge.method {
                CodeChallengeMethod::S256 => s256(verifier),
                CodeChallengeMethod::Plain => verifier.to_string(),
            };
            if bool::from(derived.as_bytes().ct_eq(challenge.challenge.as_bytes())) {
                Ok(())
            } else {
                Err(OAuthError::invalid_grant("code_verifier does not match"))
            }
        }
    }
}

fn s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// `[A-Za-z0-9-._~]{43,128}`
fn is_valid_verifier_syntax(value: &str) -> bool {
    (VERIFIER_MIN_LEN..=VERIFIER_MAX_LEN).contains(&value.len())
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}
