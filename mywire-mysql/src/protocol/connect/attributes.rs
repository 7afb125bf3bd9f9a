use std::collections::BTreeMap;

use crate::io::MySqlBufMutExt;
use crate::protocol::Capabilities;

/// Encodes `_client_name`, `_client_version` and the user supplied attributes as the
/// length-prefixed key/value block of the handshake response.
///
/// Returns `None` when the server does not accept attributes.
///
/// <https://dev.mysql.com/doc/refman/8.0/en/performance-schema-connection-attribute-tables.html>
pub(crate) fn encode_attributes(
    custom: &BTreeMap<String, String>,
    capabilities: Capabilities,
) -> Option<Vec<u8>> {
    if !capabilities.contains(Capabilities::CONNECT_ATTRS) {
        return None;
    }

    let mut attributes: BTreeMap<&str, &str> = BTreeMap::new();

    attributes.insert("_client_name", "mywire");
    attributes.insert("_client_version", env!("CARGO_PKG_VERSION"));
    attributes.extend(custom.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    // Use temporary buffer to get total length of encoded key/value pairs
    let mut pairs = Vec::new();

    for (key, value) in attributes {
        pairs.put_str_lenenc(key);
        pairs.put_str_lenenc(value);
    }

    let mut buf = Vec::with_capacity(pairs.len() + 9);
    buf.put_bytes_lenenc(&pairs);

    Some(buf)
}
