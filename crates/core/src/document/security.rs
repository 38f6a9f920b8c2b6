//! Standard security handler, classic revision (V=1, R=2, 40-bit RC4).
//!
//! Key derivation, per-object RC4 ciphering, password verification and
//! change, and the permission bit codec.

use crate::codec::arcfour::{Arcfour, rc4};
use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, PDFObject, dict_from};
use bytes::Bytes;
use log::debug;
use rustc_hash::FxHashMap;
use std::cell::RefCell;

/// Password padding constant from PDF spec.
pub const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// File key length for the classic revision (40 bits).
const KEY_LEN: usize = 5;
/// Per-object key length: file key + 5, capped at 16.
const OBJECT_KEY_LEN: usize = KEY_LEN + 5;

/// Pad or truncate a password to 32 bytes.
pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PASSWORD_PADDING[..32 - len]);
    padded
}

/// RC4 key protecting the O entry, from the owner password (or the user
/// password when no owner password is set).
fn owner_key(owner: &[u8], user: &[u8]) -> [u8; KEY_LEN] {
    let source = if owner.is_empty() { user } else { owner };
    let digest = md5::compute(pad_password(source));
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&digest.0[..KEY_LEN]);
    key
}

/// Compute the O entry: `RC4(MD5(pad(owner))[0:5], pad(user))`.
pub fn compute_o(owner: &[u8], user: &[u8]) -> Vec<u8> {
    rc4(&owner_key(owner, user), &pad_password(user))
}

/// Derive the file key: `MD5(pad(user) || O || P(LE) || ID0)[0:5]`.
///
/// P is always serialized little-endian regardless of host byte order.
pub fn compute_file_key(user: &[u8], o: &[u8], p: i32, id0: &[u8]) -> Vec<u8> {
    let mut context = md5::Context::new();
    context.consume(pad_password(user));
    context.consume(o);
    context.consume(p.to_le_bytes());
    context.consume(&id0[..id0.len().min(16)]);
    context.finalize().0[..KEY_LEN].to_vec()
}

/// Compute the U entry: `RC4(file_key, PADDING)`.
pub fn compute_u(file_key: &[u8]) -> Vec<u8> {
    rc4(file_key, &PASSWORD_PADDING)
}

/// Per-object key: `MD5(key || objid LE[0:3] || genno LE[0:2])[0:10]`.
pub fn object_key(file_key: &[u8], objid: u32, genno: u16) -> [u8; OBJECT_KEY_LEN] {
    let mut context = md5::Context::new();
    context.consume(file_key);
    context.consume(&objid.to_le_bytes()[..3]);
    context.consume(genno.to_le_bytes());
    let digest = context.finalize();
    let mut key = [0u8; OBJECT_KEY_LEN];
    key.copy_from_slice(&digest.0[..OBJECT_KEY_LEN]);
    key
}

/// The four permission flags of the classic revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub print: bool,
    pub modify: bool,
    pub copy: bool,
    pub add: bool,
}

impl Permissions {
    pub const ALL: Self = Self {
        print: true,
        modify: true,
        copy: true,
        add: true,
    };

    pub const NONE: Self = Self {
        print: false,
        modify: false,
        copy: false,
        add: false,
    };

    /// Pack into the signed 32-bit `P` field.
    ///
    /// Bits are numbered from 1: bits 1-2 are zero, bits 3-6 carry
    /// print/modify/copy/add, bits 7-32 are one.
    pub const fn bits(self) -> i32 {
        let mut p: u32 = !0 << 6;
        if self.print {
            p |= 1 << 2;
        }
        if self.modify {
            p |= 1 << 3;
        }
        if self.copy {
            p |= 1 << 4;
        }
        if self.add {
            p |= 1 << 5;
        }
        p as i32
    }

    pub const fn from_bits(p: i32) -> Self {
        let p = p as u32;
        Self {
            print: p & (1 << 2) != 0,
            modify: p & (1 << 3) != 0,
            copy: p & (1 << 4) != 0,
            add: p & (1 << 5) != 0,
        }
    }
}

/// Pack permission flags into a `P` value.
pub const fn encode_permissions(print: bool, modify: bool, copy: bool, add: bool) -> i32 {
    Permissions {
        print,
        modify,
        copy,
        add,
    }
    .bits()
}

/// Unpack a `P` value into permission flags.
pub const fn decode_permissions(p: i32) -> Permissions {
    Permissions::from_bits(p)
}

/// Source of further password attempts when the initial pair fails.
pub trait PasswordPrompt {
    /// Return an `(owner, user)` pair for attempt number `attempt`
    /// (starting at 1), or `None` to give up.
    fn prompt(&mut self, attempt: u32) -> Option<(String, String)>;
}

impl<F> PasswordPrompt for F
where
    F: FnMut(u32) -> Option<(String, String)>,
{
    fn prompt(&mut self, attempt: u32) -> Option<(String, String)> {
        self(attempt)
    }
}

fn string_entry(encrypt: &Dict, key: &str) -> Result<Vec<u8>> {
    let value = encrypt
        .get(key)
        .ok_or_else(|| PdfError::KeyError(format!("/{key} in /Encrypt")))?
        .as_string()?;
    if value.len() < 32 {
        return Err(PdfError::UnsupportedEncryption(format!(
            "/{key} entry is {} bytes, expected 32",
            value.len()
        )));
    }
    Ok(value[..32].to_vec())
}

/// Standard security handler state for one document.
pub struct SecurityHandler {
    o: Vec<u8>,
    u: Vec<u8>,
    p: i32,
    id0: Vec<u8>,
    key: Vec<u8>,
    /// User password in effect (given, or recovered from O).
    user_password: Vec<u8>,
    owner_authenticated: bool,
    key_cache: RefCell<FxHashMap<(u32, u16), [u8; OBJECT_KEY_LEN]>>,
}

impl std::fmt::Debug for SecurityHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityHandler")
            .field("p", &self.p)
            .field("owner_authenticated", &self.owner_authenticated)
            .finish_non_exhaustive()
    }
}

impl SecurityHandler {
    /// Check that an `/Encrypt` dictionary uses the classic standard handler.
    pub fn check_supported(encrypt: &Dict) -> Result<()> {
        let filter = encrypt
            .get("Filter")
            .and_then(|f| f.as_name().ok())
            .unwrap_or("");
        if filter != "Standard" {
            return Err(PdfError::UnsupportedEncryption(format!(
                "security handler /{filter}"
            )));
        }
        let v = encrypt.get("V").and_then(|v| v.as_int().ok()).unwrap_or(0);
        if v != 1 {
            return Err(PdfError::UnsupportedEncryption(format!("V={v}")));
        }
        let r = encrypt.get("R").and_then(|r| r.as_int().ok()).unwrap_or(2);
        if r != 2 {
            return Err(PdfError::UnsupportedEncryption(format!("R={r}")));
        }
        Ok(())
    }

    /// Authenticate against an existing `/Encrypt` dictionary.
    ///
    /// The owner password is tried first (recovering the user password from
    /// O), then the user password. Either way the U entry must verify.
    pub fn open(encrypt: &Dict, id0: &[u8], owner: &[u8], user: &[u8]) -> Result<Self> {
        Self::check_supported(encrypt)?;
        let o = string_entry(encrypt, "O")?;
        let u = string_entry(encrypt, "U")?;
        let p = encrypt
            .get("P")
            .ok_or_else(|| PdfError::KeyError("/P in /Encrypt".into()))?
            .as_int()? as i32;

        let mut handler = Self {
            o,
            u,
            p,
            id0: id0.to_vec(),
            key: Vec::new(),
            user_password: Vec::new(),
            owner_authenticated: false,
            key_cache: RefCell::new(FxHashMap::default()),
        };

        let recovered = rc4(&owner_key(owner, user), &handler.o);
        let recovered = strip_padding(&recovered);
        if let Some(key) = handler.verify_user(&recovered) {
            debug!("owner password accepted");
            handler.key = key;
            handler.user_password = recovered;
            handler.owner_authenticated = true;
            return Ok(handler);
        }
        if let Some(key) = handler.verify_user(user) {
            debug!("user password accepted");
            handler.key = key;
            handler.user_password = user.to_vec();
            return Ok(handler);
        }
        Err(PdfError::WrongPassword)
    }

    /// Set up encryption for a document that has none.
    pub fn create(owner: &[u8], user: &[u8], permissions: i32, id0: &[u8]) -> Self {
        let mut handler = Self {
            o: Vec::new(),
            u: Vec::new(),
            p: permissions,
            id0: id0.to_vec(),
            key: Vec::new(),
            user_password: Vec::new(),
            owner_authenticated: true,
            key_cache: RefCell::new(FxHashMap::default()),
        };
        handler.rekey(owner, user);
        handler
    }

    fn verify_user(&self, user: &[u8]) -> Option<Vec<u8>> {
        let key = compute_file_key(user, &self.o, self.p, &self.id0);
        (compute_u(&key) == self.u).then_some(key)
    }

    /// Recompute O, then the file key and U (both depend on O).
    fn rekey(&mut self, owner: &[u8], user: &[u8]) {
        self.o = compute_o(owner, user);
        self.key = compute_file_key(user, &self.o, self.p, &self.id0);
        self.u = compute_u(&self.key);
        self.user_password = user.to_vec();
        self.key_cache.borrow_mut().clear();
    }

    /// Whether the owner password was proven (or this handler created the
    /// encryption).
    pub const fn owner_authenticated(&self) -> bool {
        self.owner_authenticated
    }

    pub const fn permissions(&self) -> Permissions {
        Permissions::from_bits(self.p)
    }

    pub const fn p(&self) -> i32 {
        self.p
    }

    pub fn file_key(&self) -> &[u8] {
        &self.key
    }

    pub fn o(&self) -> &[u8] {
        &self.o
    }

    pub fn u(&self) -> &[u8] {
        &self.u
    }

    fn require_owner(&self, what: &str) -> Result<()> {
        if self.owner_authenticated {
            Ok(())
        } else {
            Err(PdfError::PermissionDenied(format!(
                "{what} requires the owner password"
            )))
        }
    }

    /// Replace both passwords. The whole document must be re-ciphered.
    pub fn set_passwords(&mut self, owner: &[u8], user: &[u8]) -> Result<()> {
        self.require_owner("changing passwords")?;
        self.rekey(owner, user);
        Ok(())
    }

    /// Replace the permission flags, keeping the passwords. O does not
    /// depend on P, so it is kept; the file key and U are recomputed.
    pub fn set_permissions(&mut self, permissions: i32) -> Result<()> {
        self.require_owner("changing permissions")?;
        self.p = permissions;
        self.key = compute_file_key(&self.user_password, &self.o, self.p, &self.id0);
        self.u = compute_u(&self.key);
        self.key_cache.borrow_mut().clear();
        Ok(())
    }

    /// Object key for `(objid, genno)`, derived once and cached.
    pub fn object_key(&self, objid: u32, genno: u16) -> [u8; OBJECT_KEY_LEN] {
        *self
            .key_cache
            .borrow_mut()
            .entry((objid, genno))
            .or_insert_with(|| object_key(&self.key, objid, genno))
    }

    /// Encrypt or decrypt bytes belonging to `(objid, genno)`.
    pub fn crypt(&self, objid: u32, genno: u16, data: &[u8]) -> Vec<u8> {
        rc4(&self.object_key(objid, genno), data)
    }

    /// Cipher every string and stream payload inside `obj` in place.
    pub fn crypt_object(&self, obj: &mut PDFObject, objid: u32, genno: u16) {
        let key = self.object_key(objid, genno);
        obj.map_strings(&mut |s| Arcfour::new(&key).process_in_place(s));
        if let PDFObject::Stream(stream) = obj {
            let mut data = stream.get_rawdata().to_vec();
            Arcfour::new(&key).process_in_place(&mut data);
            stream.replace_payload(Bytes::from(data));
        }
    }

    /// The `/Encrypt` dictionary describing this handler.
    pub fn encrypt_dict(&self) -> Dict {
        dict_from([
            ("Filter", PDFObject::name("Standard")),
            ("V", PDFObject::Int(1)),
            ("R", PDFObject::Int(2)),
            ("Length", PDFObject::Int(40)),
            ("O", PDFObject::String(self.o.clone())),
            ("U", PDFObject::String(self.u.clone())),
            ("P", PDFObject::Int(i64::from(self.p))),
        ])
    }
}

/// Remove the trailing password padding from a recovered password.
fn strip_padding(padded: &[u8]) -> Vec<u8> {
    for len in 0..padded.len() {
        if padded[len..] == PASSWORD_PADDING[..padded.len() - len] {
            return padded[..len].to_vec();
        }
    }
    padded.to_vec()
}
