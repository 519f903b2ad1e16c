//! Hash helpers. Todo hash de contenido del motor pasa por aquí para poder
//! cambiar de algoritmo sin tocar al resto.

use serde_json::Value;

use super::to_canonical_json;

/// Hash blake3 (hex, 64 chars) de un string.
pub fn hash_str(s: &str) -> String {
    blake3::hash(s.as_bytes()).to_hex().to_string()
}

/// Hash del JSON canónico de un `Value`: dos objetos con las mismas claves en
/// distinto orden producen el mismo hash.
pub fn hash_value(v: &Value) -> String {
    hash_str(&to_canonical_json(v))
}
