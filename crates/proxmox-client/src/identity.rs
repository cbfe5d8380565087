//! Guest identity extraction.
//!
//! A guest is matched to a cluster node by the UUID in its SMBIOS type 1
//! settings. The kernel reports the same value as the machine's product UUID,
//! which the kubelet publishes as the node's `systemUUID`.

const UUID_TOKEN: &str = "uuid=";

/// Extracts the identity key from an SMBIOS type 1 string.
///
/// The input is a comma-separated list of `key=value` tokens such as
/// `manufacturer=QEMU,uuid=0f6c3e4a-...`. The first token containing `uuid=`
/// wins and its value is everything after the token's first `=`. The value is
/// returned as-is, without format validation.
pub fn extract_identity_key(smbios: &str) -> Option<&str> {
    smbios
        .split(',')
        .find(|token| token.contains(UUID_TOKEN))
        .and_then(|token| token.split_once('='))
        .map(|(_, value)| value)
}
