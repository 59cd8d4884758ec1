use secrecy::SecretString;

use super::CryptoError;

/// Separator between the host, OS and architecture components.
const IDENTITY_SEPARATOR: char = '-';

/// Returns the identity string of the running machine.
///
/// Composed as `<hostname>-<os>-<arch>`, e.g. `workstation-linux-x86_64`.
/// This is key-derivation input, not a user secret: it makes envelopes
/// readable only on this machine, not only by this user.
///
/// # Errors
///
/// Returns [`CryptoError::IdentityUnavailable`] if the host name cannot be
/// resolved or is empty.
pub fn machine_identity() -> Result<SecretString, CryptoError> {
    let host = hostname::get()
        .map_err(|e| CryptoError::IdentityUnavailable(e.to_string()))?
        .to_string_lossy()
        .trim()
        .to_string();

    if host.is_empty() {
        return Err(CryptoError::IdentityUnavailable(
            "host name is empty".to_string(),
        ));
    }

    Ok(SecretString::from(compose_identity(
        &host,
        std::env::consts::OS,
        std::env::consts::ARCH,
    )))
}

fn compose_identity(host: &str, os: &str, arch: &str) -> String {
    format!("{host}{IDENTITY_SEPARATOR}{os}{IDENTITY_SEPARATOR}{arch}")
}
