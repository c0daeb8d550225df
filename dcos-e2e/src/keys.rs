//! SSH key material for logging in to nodes

use std::io::Write;
use std::path::Path;

use crate::{Error, Result};

const KEY_BITS: usize = 2048;
const KEY_COMMENT: &str = "dcos-e2e";

/// Generate an RSA key pair, writing the unencrypted private key (readable
/// only by its owner) and the OpenSSH public key. Returns the public key line.
pub fn generate_key_pair(private_key_path: &Path, public_key_path: &Path) -> Result<String> {
    let keypair = ssh_key::private::RsaKeypair::random(&mut rand::rngs::OsRng, KEY_BITS)
        .map_err(|e| Error::provisioning(format!("failed to generate ssh key: {e}")))?;
    let private_key =
        ssh_key::PrivateKey::new(ssh_key::private::KeypairData::from(keypair), KEY_COMMENT)
            .map_err(|e| Error::provisioning(format!("failed to generate ssh key: {e}")))?;

    let private_pem = private_key
        .to_openssh(ssh_key::LineEnding::LF)
        .map_err(|e| Error::serialization(format!("ssh private key: {e}")))?;
    let public_line = private_key
        .public_key()
        .to_openssh()
        .map_err(|e| Error::serialization(format!("ssh public key: {e}")))?;

    write_owner_only(private_key_path, private_pem.as_bytes())?;
    std::fs::write(public_key_path, format!("{public_line}\n"))?;

    tracing::debug!(path = %private_key_path.display(), "generated ssh key pair");
    Ok(public_line)
}

#[cfg(unix)]
fn write_owner_only(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(content)
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(content)
}
