//! PDF Document - object store and revision engine.
//!
//! Handles:
//! - Header and chained xref/trailer loading (newest revision wins)
//! - Bounded object parsing and the lazy object cache
//! - Object mutation with change tracking
//! - Incremental and full serialization
//! - Document-level encryption state

use super::security::{PasswordPrompt, Permissions, SecurityHandler};
use super::storage::ByteStorage;
use super::xref::{XRef, XRefEntry, find_startxref, write_trailer, write_xref};
use crate::codec::filters::apply_filters;
use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, IndirectObject, PDFObjRef, PDFObject, PDFStream};
use crate::parser::pdf_parser::PDFParser;
use crate::parser::writer::{WriterOptions, write_indirect};
use bytes::Bytes;
use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

pub const DEFAULT_PASSWORD_ATTEMPTS: u32 = 3;
const MAX_RESOLVE_DEPTH: usize = 32;

/// Settings for opening a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    pub owner_password: String,
    pub user_password: String,
    /// Upper bound on interactive prompts after the initial pair fails.
    pub max_password_attempts: u32,
    /// Write objects in their original file order on full saves.
    pub preserve_order: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            owner_password: String::new(),
            user_password: String::new(),
            max_password_attempts: DEFAULT_PASSWORD_ATTEMPTS,
            preserve_order: false,
        }
    }
}

impl OpenOptions {
    pub fn with_owner_password(mut self, password: impl Into<String>) -> Self {
        self.owner_password = password.into();
        self
    }

    pub fn with_user_password(mut self, password: impl Into<String>) -> Self {
        self.user_password = password.into();
        self
    }

    pub fn with_passwords(self, owner: impl Into<String>, user: impl Into<String>) -> Self {
        self.with_owner_password(owner).with_user_password(user)
    }

    pub const fn with_max_password_attempts(mut self, attempts: u32) -> Self {
        self.max_password_attempts = attempts;
        self
    }

    pub const fn with_preserve_order(mut self, preserve: bool) -> Self {
        self.preserve_order = preserve;
        self
    }
}

/// How [`PDFDocument::save`] serializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    /// Append changed objects as a new revision.
    #[default]
    Incremental,
    /// Rewrite the whole file as a single revision.
    Full,
}

/// Settings for saving a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    pub mode: SaveMode,
    pub preserve_order: bool,
    pub max_string_line: usize,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            mode: SaveMode::Incremental,
            preserve_order: false,
            max_string_line: WriterOptions::default().max_string_line,
        }
    }
}

impl SaveOptions {
    pub fn incremental() -> Self {
        Self::default()
    }

    pub fn full() -> Self {
        Self::default().with_mode(SaveMode::Full)
    }

    pub const fn with_mode(mut self, mode: SaveMode) -> Self {
        self.mode = mode;
        self
    }

    pub const fn with_preserve_order(mut self, preserve: bool) -> Self {
        self.preserve_order = preserve;
        self
    }

    pub const fn with_max_string_line(mut self, max: usize) -> Self {
        self.max_string_line = max;
        self
    }

    fn writer_options(&self) -> WriterOptions {
        WriterOptions::default().with_max_string_line(self.max_string_line)
    }
}

/// Everything derived from the byte buffer's xref chain.
#[derive(Debug, Default)]
struct Index {
    /// Header version, e.g. "1.4"
    version: String,
    /// Sections newest first
    xrefs: Vec<XRef>,
    /// Merged entries; newer revisions win
    entries: BTreeMap<u32, XRefEntry>,
    /// Object offset -> offset of the next object or xref section
    bounds: FxHashMap<usize, usize>,
    /// Live object numbers in file-offset order
    load_order: Vec<u32>,
    /// Merged trailer without `Prev`
    trailer: Dict,
    /// Offset of the newest xref section
    startxref: usize,
}

impl Index {
    fn build(data: &[u8]) -> Result<Self> {
        let version = parse_header(data)?;
        let startxref = find_startxref(data)?;

        let mut xrefs = Vec::new();
        let mut visited = FxHashSet::default();
        let mut pos = Some(startxref);
        while let Some(p) = pos {
            if !visited.insert(p) {
                warn!("xref chain loops back to offset {p}");
                break;
            }
            let xref = XRef::parse(data, p)?;
            pos = xref.prev();
            xrefs.push(xref);
        }

        let mut entries = BTreeMap::new();
        let mut trailer = Dict::new();
        for xref in &xrefs {
            for (objid, entry) in &xref.offsets {
                entries.entry(*objid).or_insert(*entry);
            }
            for (key, value) in &xref.trailer {
                if !trailer.contains_key(key) {
                    trailer.insert(key.clone(), value.clone());
                }
            }
        }
        trailer.shift_remove("Prev");
        trailer.shift_remove("XRefStm");

        let mut positions: Vec<usize> = xrefs
            .iter()
            .flat_map(|x| x.offsets.values().filter_map(XRefEntry::offset))
            .chain(xrefs.iter().map(|x| x.pos))
            .collect();
        positions.sort_unstable();
        positions.dedup();
        let bounds = positions.windows(2).map(|w| (w[0], w[1])).collect();

        let mut live: Vec<(usize, u32)> = entries
            .iter()
            .filter_map(|(objid, e)| e.offset().map(|off| (off, *objid)))
            .collect();
        live.sort_unstable();
        let load_order = live.into_iter().map(|(_, objid)| objid).collect();

        debug!(
            "indexed {} revision(s), {} entries",
            xrefs.len(),
            entries.len()
        );

        Ok(Self {
            version,
            xrefs,
            entries,
            bounds,
            load_order,
            trailer,
            startxref,
        })
    }

    /// Parse bound for an object at `offset`; end of buffer when the
    /// recorded bound is missing or inconsistent.
    fn bound_for(&self, offset: usize, len: usize) -> usize {
        self.bounds
            .get(&offset)
            .copied()
            .filter(|&b| b > offset && b <= len)
            .unwrap_or(len)
    }

    fn next_objid(&self) -> u32 {
        let size = self
            .trailer
            .get("Size")
            .and_then(|s| s.as_int().ok())
            .and_then(|s| u32::try_from(s).ok())
            .unwrap_or(0);
        let max = self
            .entries
            .keys()
            .next_back()
            .map_or(0, |m| m.saturating_add(1));
        size.max(max).max(1)
    }
}

/// Read the `%PDF-M.m` header version.
fn parse_header(data: &[u8]) -> Result<String> {
    const MAGIC: &[u8] = b"%PDF-";
    let window = &data[..data.len().min(1024)];
    let start = window
        .windows(MAGIC.len())
        .position(|w| w == MAGIC)
        .ok_or_else(|| PdfError::parse(data, 0, "missing %PDF- header"))?
        + MAGIC.len();
    let end = data[start..]
        .iter()
        .position(|b| b.is_ascii_whitespace() || *b == b'%')
        .map_or(data.len(), |n| start + n);
    Ok(String::from_utf8_lossy(&data[start..end]).into_owned())
}

/// Add free entries for `frees` (number, next generation), linked from
/// entry 0 in ascending order.
fn add_free_list(entries: &mut BTreeMap<u32, XRefEntry>, frees: &[(u32, u16)]) {
    let mut next = 0;
    for &(objid, genno) in frees.iter().rev() {
        entries.insert(objid, XRefEntry::Free { next, genno });
        next = objid;
    }
    entries.insert(0, XRefEntry::Free { next, genno: 65535 });
}

/// Replace every occurrence of `find`, returning the new bytes and count.
fn replace_bytes(haystack: &[u8], find: &[u8], replace: &[u8]) -> (Vec<u8>, usize) {
    let mut out = Vec::with_capacity(haystack.len());
    let mut count = 0;
    let mut i = 0;
    while i < haystack.len() {
        if haystack[i..].starts_with(find) {
            out.extend_from_slice(replace);
            i += find.len();
            count += 1;
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    (out, count)
}

/// PDF Document - object store over one byte buffer plus pending edits.
///
/// Not thread-safe: the object cache mutates on read.
pub struct PDFDocument {
    data: Bytes,
    index: Index,
    cache: RefCell<FxHashMap<u32, Rc<PDFObject>>>,
    resolving: RefCell<FxHashSet<u32>>,
    /// Objects pending serialization; their values live in `cache`.
    changes: BTreeSet<u32>,
    /// Objects deleted since the last save.
    deleted: BTreeSet<u32>,
    next_objid: u32,
    security: Option<SecurityHandler>,
    encrypt_objid: Option<u32>,
    needs_full_rewrite: bool,
    preserve_order: bool,
}

impl std::fmt::Debug for PDFDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PDFDocument")
            .field("version", &self.index.version)
            .field("len", &self.data.len())
            .field("revisions", &self.index.xrefs.len())
            .field("changes", &self.changes)
            .field("encrypted", &self.security.is_some())
            .finish_non_exhaustive()
    }
}

impl PDFDocument {
    /// Open an unencrypted (or blank-password) document.
    pub fn new(data: impl Into<Bytes>) -> Result<Self> {
        Self::open(data, &OpenOptions::default())
    }

    /// Open with explicit options; a wrong password fails immediately.
    pub fn open(data: impl Into<Bytes>, options: &OpenOptions) -> Result<Self> {
        Self::open_inner(data.into(), options, None)
    }

    /// Open, asking `prompt` for further passwords while verification fails.
    pub fn open_with_prompt(
        data: impl Into<Bytes>,
        options: &OpenOptions,
        prompt: &mut dyn PasswordPrompt,
    ) -> Result<Self> {
        Self::open_inner(data.into(), options, Some(prompt))
    }

    /// Read a document from a storage backend.
    pub fn load(storage: &impl ByteStorage, options: &OpenOptions) -> Result<Self> {
        Self::open(storage.read_all()?, options)
    }

    fn open_inner(
        data: Bytes,
        options: &OpenOptions,
        prompt: Option<&mut dyn PasswordPrompt>,
    ) -> Result<Self> {
        let index = Index::build(&data)?;
        let next_objid = index.next_objid();
        let mut doc = Self {
            data,
            index,
            cache: RefCell::new(FxHashMap::default()),
            resolving: RefCell::new(FxHashSet::default()),
            changes: BTreeSet::new(),
            deleted: BTreeSet::new(),
            next_objid,
            security: None,
            encrypt_objid: None,
            needs_full_rewrite: false,
            preserve_order: options.preserve_order,
        };
        doc.setup_security(options, prompt)?;
        Ok(doc)
    }

    fn setup_security(
        &mut self,
        options: &OpenOptions,
        mut prompt: Option<&mut dyn PasswordPrompt>,
    ) -> Result<()> {
        let Some(encrypt_obj) = self.index.trailer.get("Encrypt").cloned() else {
            return Ok(());
        };
        if let PDFObject::Ref(r) = &encrypt_obj {
            self.encrypt_objid = Some(r.objid);
        }
        let encrypt = match self.resolve(&encrypt_obj) {
            PDFObject::Dict(dict) => dict,
            other => {
                return Err(PdfError::TypeError {
                    expected: "dict",
                    got: other.type_name(),
                });
            }
        };
        SecurityHandler::check_supported(&encrypt)?;
        let id0 = self.document_id0();

        let mut owner = options.owner_password.clone();
        let mut user = options.user_password.clone();
        let mut attempt = 0;
        let handler = loop {
            match SecurityHandler::open(&encrypt, &id0, owner.as_bytes(), user.as_bytes()) {
                Ok(handler) => break handler,
                Err(PdfError::WrongPassword) => {
                    attempt += 1;
                    if attempt > options.max_password_attempts {
                        return Err(PdfError::WrongPassword);
                    }
                    let Some(prompt) = prompt.as_mut() else {
                        return Err(PdfError::WrongPassword);
                    };
                    let Some((o, u)) = prompt.prompt(attempt) else {
                        return Err(PdfError::WrongPassword);
                    };
                    debug!("password attempt {attempt} failed, retrying");
                    owner = o;
                    user = u;
                }
                Err(e) => return Err(e),
            }
        };
        self.security = Some(handler);

        // Anything parsed before the key was known is stale.
        let encrypt_objid = self.encrypt_objid;
        self.cache
            .get_mut()
            .retain(|objid, _| Some(*objid) == encrypt_objid);
        Ok(())
    }

    /// First element of the trailer `ID` array (empty if absent).
    fn document_id0(&self) -> Vec<u8> {
        self.index
            .trailer
            .get("ID")
            .map(|id| self.resolve(id))
            .and_then(|id| {
                id.as_array()
                    .ok()
                    .and_then(|arr| arr.first())
                    .and_then(|first| first.as_string().ok())
                    .map(<[u8]>::to_vec)
            })
            .unwrap_or_default()
    }

    /// Current byte buffer (as loaded or last saved).
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// Header version string.
    pub fn version(&self) -> &str {
        &self.index.version
    }

    /// Trailer dictionary (merged over the revision chain, without `Prev`).
    pub const fn trailer(&self) -> &Dict {
        &self.index.trailer
    }

    /// Number of revisions in the xref chain.
    pub fn revision_count(&self) -> usize {
        self.index.xrefs.len()
    }

    /// Offset of the newest xref section.
    pub const fn startxref(&self) -> usize {
        self.index.startxref
    }

    /// Resolved document catalog (`Root`).
    pub fn catalog(&self) -> Option<Dict> {
        self.index
            .trailer
            .get("Root")
            .and_then(|root| self.resolve(root).as_dict().ok().cloned())
    }

    /// Generation of `objid` in the loaded xref index.
    pub fn generation(&self, objid: u32) -> u16 {
        match self.index.entries.get(&objid) {
            Some(XRefEntry::InUse { genno, .. }) => *genno,
            _ => 0,
        }
    }

    /// Numbers of all live objects, ascending.
    pub fn object_ids(&self) -> Vec<u32> {
        let mut ids: BTreeSet<u32> = self
            .index
            .entries
            .iter()
            .filter(|(objid, e)| !e.is_free() && **objid != 0)
            .map(|(objid, _)| *objid)
            .collect();
        ids.extend(self.changes.iter().copied());
        ids.retain(|objid| !self.deleted.contains(objid));
        ids.into_iter().collect()
    }

    /// Load an object, propagating parse and lookup failures.
    pub fn load_object(&self, objid: u32) -> Result<Rc<PDFObject>> {
        if let Some(obj) = self.cache.borrow().get(&objid) {
            return Ok(Rc::clone(obj));
        }
        if self.deleted.contains(&objid) {
            return Err(PdfError::ObjectNotFound(objid));
        }
        let Some(XRefEntry::InUse { offset, .. }) = self.index.entries.get(&objid).copied() else {
            return Err(PdfError::ObjectNotFound(objid));
        };
        if !self.resolving.borrow_mut().insert(objid) {
            return Err(PdfError::Structure(format!(
                "circular reference through object {objid}"
            )));
        }
        let parsed = self.parse_object_at(objid, offset);
        self.resolving.borrow_mut().remove(&objid);

        let IndirectObject {
            genno, mut value, ..
        } = parsed?;
        if let Some(handler) = &self.security
            && Some(objid) != self.encrypt_objid
        {
            handler.crypt_object(&mut value, objid, genno);
        }
        let obj = Rc::new(value);
        self.cache.borrow_mut().insert(objid, Rc::clone(&obj));
        Ok(obj)
    }

    /// Dereference an object number; dangling references log and yield `None`.
    pub fn getobj(&self, objid: u32) -> Option<Rc<PDFObject>> {
        match self.load_object(objid) {
            Ok(obj) => Some(obj),
            Err(err) => {
                warn!("cannot resolve object {objid}: {err}");
                None
            }
        }
    }

    /// Follow references until a direct value; dangling ends in `Null`.
    pub fn resolve(&self, obj: &PDFObject) -> PDFObject {
        let mut current = obj.clone();
        for _ in 0..MAX_RESOLVE_DEPTH {
            let PDFObject::Ref(r) = &current else {
                return current;
            };
            current = self
                .getobj(r.objid)
                .map_or(PDFObject::Null, |o| (*o).clone());
        }
        warn!("reference chain too deep");
        PDFObject::Null
    }

    /// Resolve to a dictionary (stream dictionaries included).
    pub fn resolve_dict(&self, obj: &PDFObject) -> Option<Dict> {
        match self.resolve(obj) {
            PDFObject::Dict(dict) => Some(dict),
            PDFObject::Stream(stream) => Some(stream.attrs),
            _ => None,
        }
    }

    fn parse_object_at(&self, objid: u32, offset: usize) -> Result<IndirectObject> {
        let data = self.data.as_ref();
        if offset >= data.len() {
            return Err(PdfError::parse(
                data,
                offset,
                format!("object {objid} offset beyond end of file"),
            ));
        }
        let bound = self.index.bound_for(offset, data.len());
        let resolve_length =
            |r: &PDFObjRef| self.load_object(r.objid).ok().and_then(|o| o.as_int().ok());

        let mut parser = PDFParser::with_bounds(data, offset, bound);
        match parser.parse_indirect(Some(objid), resolve_length) {
            Ok(obj) => Ok(obj),
            Err(err) if bound < data.len() => {
                debug!("object {objid}: bounded parse failed ({err}), retrying to end of file");
                let mut parser = PDFParser::with_bounds(data, offset, data.len());
                parser.parse_indirect(Some(objid), resolve_length)
            }
            Err(err) => Err(err),
        }
    }

    // === Mutation ===

    /// Replace (or create) object `objid`.
    pub fn set_object(&mut self, objid: u32, value: PDFObject) {
        self.cache.get_mut().insert(objid, Rc::new(value));
        self.deleted.remove(&objid);
        self.changes.insert(objid);
        self.next_objid = self.next_objid.max(objid.saturating_add(1));
    }

    /// Store a new object under the next unused number.
    pub fn add_object(&mut self, value: PDFObject) -> PDFObjRef {
        let objid = self.next_objid;
        self.set_object(objid, value);
        PDFObjRef::new(objid, 0)
    }

    /// Delete an object; its slot becomes free on the next save.
    pub fn delete_object(&mut self, objid: u32) -> bool {
        self.cache.get_mut().remove(&objid);
        let was_changed = self.changes.remove(&objid);
        let indexed = self
            .index
            .entries
            .get(&objid)
            .is_some_and(|e| !e.is_free());
        if indexed {
            self.deleted.insert(objid);
        }
        indexed || was_changed
    }

    /// Mutable access to an object; it is marked changed.
    pub fn object_mut(&mut self, objid: u32) -> Option<&mut PDFObject> {
        self.getobj(objid)?;
        self.changes.insert(objid);
        let obj = self.cache.get_mut().get_mut(&objid)?;
        Some(Rc::make_mut(obj))
    }

    /// Queue an object for rewriting without modifying it.
    pub fn mark_changed(&mut self, objid: u32) -> bool {
        if self.getobj(objid).is_some() {
            self.changes.insert(objid);
            true
        } else {
            false
        }
    }

    /// Objects pending serialization.
    pub fn changes(&self) -> impl Iterator<Item = u32> + '_ {
        self.changes.iter().copied()
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty() || !self.deleted.is_empty() || self.needs_full_rewrite
    }

    pub(crate) fn trailer_mut(&mut self) -> &mut Dict {
        &mut self.index.trailer
    }

    // === Document-wide operations ===

    /// Replace `find` with `replace` in every string of every object
    /// (stream payloads excluded). Returns the number of replacements.
    pub fn replace_strings(&mut self, find: &[u8], replace: &[u8]) -> usize {
        if find.is_empty() {
            return 0;
        }
        let mut total = 0;
        for objid in self.object_ids() {
            if Some(objid) == self.encrypt_objid {
                continue;
            }
            let Some(obj) = self.getobj(objid) else {
                continue;
            };
            let mut value = (*obj).clone();
            let mut count = 0;
            value.map_strings(&mut |s| {
                let (replaced, n) = replace_bytes(s, find, replace);
                if n > 0 {
                    *s = replaced;
                    count += n;
                }
            });
            if count > 0 {
                total += count;
                self.set_object(objid, value);
            }
        }
        total
    }

    /// Delete every object not reachable from the trailer.
    pub fn remove_unreferenced_objects(&mut self) -> usize {
        let mut seen = FxHashSet::default();
        let mut stack = Vec::new();
        PDFObject::Dict(self.index.trailer.clone()).for_each_ref(&mut |r| stack.push(r.objid));
        while let Some(objid) = stack.pop() {
            if !seen.insert(objid) {
                continue;
            }
            if let Ok(obj) = self.load_object(objid) {
                obj.for_each_ref(&mut |r| {
                    if !seen.contains(&r.objid) {
                        stack.push(r.objid);
                    }
                });
            }
        }
        let unreferenced: Vec<u32> = self
            .object_ids()
            .into_iter()
            .filter(|objid| !seen.contains(objid))
            .collect();
        for &objid in &unreferenced {
            self.delete_object(objid);
        }
        debug!("removed {} unreferenced object(s)", unreferenced.len());
        unreferenced.len()
    }

    /// Document information dictionary.
    pub fn info(&self) -> Option<Dict> {
        self.index
            .trailer
            .get("Info")
            .and_then(|info| self.resolve_dict(info))
    }

    /// Set one information entry, creating the `Info` object if needed.
    pub fn set_info(&mut self, key: &str, value: PDFObject) {
        if let Some(PDFObject::Ref(r)) = self.index.trailer.get("Info").cloned()
            && let Some(PDFObject::Dict(dict)) = self.object_mut(r.objid)
        {
            dict.insert(key.to_string(), value);
            return;
        }
        let mut dict = self.info().unwrap_or_default();
        dict.insert(key.to_string(), value);
        let r = self.add_object(PDFObject::Dict(dict));
        self.index.trailer.insert("Info".into(), PDFObject::Ref(r));
    }

    /// Decode a stream through its filter chain. Unsupported or corrupt
    /// filters log and yield the undecoded payload.
    pub fn decode_stream(&self, stream: &PDFStream) -> Vec<u8> {
        let filters: Vec<String> = match stream.get("Filter").map(|f| self.resolve(f)) {
            Some(PDFObject::Name(name)) => vec![name],
            Some(PDFObject::Array(arr)) => arr
                .iter()
                .filter_map(|f| self.resolve(f).as_name().ok().map(str::to_owned))
                .collect(),
            _ => Vec::new(),
        };
        if filters.is_empty() {
            return stream.get_rawdata().to_vec();
        }
        let parms: Vec<Option<Dict>> = match stream
            .get("DecodeParms")
            .or_else(|| stream.get("DP"))
            .map(|p| self.resolve(p))
        {
            Some(PDFObject::Dict(dict)) => vec![Some(dict)],
            Some(PDFObject::Array(arr)) => arr.iter().map(|p| self.resolve_dict(p)).collect(),
            _ => Vec::new(),
        };
        let names: Vec<&str> = filters.iter().map(String::as_str).collect();
        let parm_refs: Vec<Option<&Dict>> = parms.iter().map(Option::as_ref).collect();
        match apply_filters(stream.get_rawdata(), &names, &parm_refs) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!("{err}; keeping undecoded stream data");
                stream.get_rawdata().to_vec()
            }
        }
    }

    // === Security ===

    pub const fn is_encrypted(&self) -> bool {
        self.security.is_some()
    }

    pub const fn security_handler(&self) -> Option<&SecurityHandler> {
        self.security.as_ref()
    }

    /// Permission flags; unencrypted documents allow everything.
    pub fn permissions(&self) -> Permissions {
        self.security
            .as_ref()
            .map_or(Permissions::ALL, SecurityHandler::permissions)
    }

    /// Whether owner rights are held (always true when unencrypted).
    pub fn owner_authenticated(&self) -> bool {
        self.security
            .as_ref()
            .is_none_or(SecurityHandler::owner_authenticated)
    }

    /// Encrypt a document that has no encryption yet.
    pub fn encrypt(&mut self, owner: &str, user: &str, permissions: Permissions) -> Result<()> {
        if self.security.is_some() {
            return Err(PdfError::Structure("document is already encrypted".into()));
        }
        let id0 = self.ensure_id();
        let handler =
            SecurityHandler::create(owner.as_bytes(), user.as_bytes(), permissions.bits(), &id0);
        let r = self.add_object(PDFObject::Dict(handler.encrypt_dict()));
        self.index.trailer.insert("Encrypt".into(), PDFObject::Ref(r));
        self.encrypt_objid = Some(r.objid);
        self.security = Some(handler);
        self.needs_full_rewrite = true;
        Ok(())
    }

    /// Change both passwords (owner rights required). Forces a full
    /// rewrite on the next save.
    pub fn set_passwords(&mut self, owner: &str, user: &str) -> Result<()> {
        let handler = self
            .security
            .as_mut()
            .ok_or_else(|| PdfError::Structure("document is not encrypted".into()))?;
        handler.set_passwords(owner.as_bytes(), user.as_bytes())?;
        self.store_encrypt_dict();
        Ok(())
    }

    /// Change the permission flags (owner rights required). Forces a full
    /// rewrite on the next save.
    pub fn set_permissions(&mut self, permissions: Permissions) -> Result<()> {
        let handler = self
            .security
            .as_mut()
            .ok_or_else(|| PdfError::Structure("document is not encrypted".into()))?;
        handler.set_permissions(permissions.bits())?;
        self.store_encrypt_dict();
        Ok(())
    }

    fn store_encrypt_dict(&mut self) {
        let Some(handler) = &self.security else {
            return;
        };
        let dict = handler.encrypt_dict();
        match self.encrypt_objid {
            Some(objid) => {
                let mut merged = self
                    .getobj(objid)
                    .and_then(|o| o.as_dict().ok().cloned())
                    .unwrap_or_default();
                merged.extend(dict);
                self.set_object(objid, PDFObject::Dict(merged));
            }
            None => {
                self.index
                    .trailer
                    .insert("Encrypt".into(), PDFObject::Dict(dict));
            }
        }
        self.needs_full_rewrite = true;
    }

    /// Return the first `ID` string, creating an `ID` pair if missing.
    fn ensure_id(&mut self) -> Vec<u8> {
        let id0 = self.document_id0();
        if !id0.is_empty() {
            return id0;
        }
        let mut context = md5::Context::new();
        context.consume(&self.data);
        context.consume(self.data.len().to_le_bytes());
        let id = context.finalize().0.to_vec();
        self.index.trailer.insert(
            "ID".into(),
            PDFObject::Array(vec![
                PDFObject::HexString(id.clone()),
                PDFObject::HexString(id.clone()),
            ]),
        );
        id
    }

    // === Serialization ===

    /// Serialize pending changes and adopt the result as the new buffer.
    ///
    /// Incremental saves without pending changes return the current bytes
    /// unchanged. A password or permission change forces a full rewrite.
    pub fn save(&mut self, options: &SaveOptions) -> Result<Bytes> {
        let mode = if self.needs_full_rewrite {
            SaveMode::Full
        } else {
            options.mode
        };
        let out = match mode {
            SaveMode::Incremental if !self.has_changes() => return Ok(self.data.clone()),
            SaveMode::Incremental => self.write_incremental(options),
            SaveMode::Full => self.write_full(options)?,
        };
        self.adopt(Bytes::from(out))?;
        Ok(self.data.clone())
    }

    /// Save and hand the bytes to a storage backend.
    pub fn save_to(&mut self, storage: &mut impl ByteStorage, options: &SaveOptions) -> Result<()> {
        let bytes = self.save(options)?;
        storage.write_all(&bytes)
    }

    fn write_one(
        &self,
        out: &mut Vec<u8>,
        objid: u32,
        genno: u16,
        value: &PDFObject,
        opts: &WriterOptions,
    ) {
        match &self.security {
            Some(handler) if Some(objid) != self.encrypt_objid => {
                let mut ciphered = value.clone();
                handler.crypt_object(&mut ciphered, objid, genno);
                write_indirect(out, objid, genno, &ciphered, opts);
            }
            _ => write_indirect(out, objid, genno, value, opts),
        }
    }

    fn write_incremental(&self, options: &SaveOptions) -> Vec<u8> {
        let opts = options.writer_options();
        let mut out = self.data.to_vec();
        if !out.ends_with(b"\n") {
            out.push(b'\n');
        }

        let mut entries = BTreeMap::new();
        for &objid in &self.changes {
            let Some(value) = self.cache.borrow().get(&objid).cloned() else {
                continue;
            };
            let genno = match self.index.entries.get(&objid) {
                Some(XRefEntry::InUse { genno, .. }) => genno.saturating_add(1),
                Some(XRefEntry::Free { genno, .. }) => *genno,
                None => 0,
            };
            let offset = out.len();
            self.write_one(&mut out, objid, genno, &value, &opts);
            entries.insert(objid, XRefEntry::InUse { offset, genno });
        }

        if !self.deleted.is_empty() {
            let frees: Vec<(u32, u16)> = self
                .deleted
                .iter()
                .map(|&objid| {
                    let genno = self
                        .index
                        .entries
                        .get(&objid)
                        .map_or(0, |e| e.genno().saturating_add(1));
                    (objid, genno)
                })
                .collect();
            add_free_list(&mut entries, &frees);
        }

        let mut trailer = self.index.trailer.clone();
        trailer.insert("Size".into(), PDFObject::Int(i64::from(self.next_objid)));
        trailer.insert(
            "Prev".into(),
            PDFObject::Int(self.index.startxref as i64),
        );

        let xref_pos = out.len();
        write_xref(&mut out, &entries);
        write_trailer(&mut out, &trailer, xref_pos);
        debug!(
            "incremental save: {} object(s), {} deleted",
            self.changes.len(),
            self.deleted.len()
        );
        out
    }

    /// Object numbers in write order for a full save.
    fn write_order(&self, preserve: bool) -> Vec<u32> {
        let mut ids = self.object_ids();
        if preserve {
            let rank: FxHashMap<u32, usize> = self
                .index
                .load_order
                .iter()
                .enumerate()
                .map(|(i, objid)| (*objid, i))
                .collect();
            ids.sort_by_key(|objid| (rank.get(objid).copied().unwrap_or(usize::MAX), *objid));
        }
        ids
    }

    fn write_full(&self, options: &SaveOptions) -> Result<Vec<u8>> {
        let opts = options.writer_options();
        let mut out = format!("%PDF-{}\n", self.index.version).into_bytes();
        out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

        let mut entries = BTreeMap::new();
        for objid in self.write_order(options.preserve_order || self.preserve_order) {
            let value = match self.load_object(objid) {
                Ok(value) => value,
                Err(PdfError::ObjectNotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            let offset = out.len();
            self.write_one(&mut out, objid, 0, &value, &opts);
            entries.insert(objid, XRefEntry::InUse { offset, genno: 0 });
        }

        let size = entries
            .keys()
            .next_back()
            .map_or(1, |m| m.saturating_add(1));
        let frees: Vec<(u32, u16)> = (1..size)
            .filter(|objid| !entries.contains_key(objid))
            .map(|objid| (objid, 0))
            .collect();
        add_free_list(&mut entries, &frees);

        let mut trailer = self.index.trailer.clone();
        trailer.shift_remove("Prev");
        trailer.insert("Size".into(), PDFObject::Int(i64::from(size)));

        let xref_pos = out.len();
        write_xref(&mut out, &entries);
        write_trailer(&mut out, &trailer, xref_pos);
        debug!("full save: {} object(s)", entries.len() - 1 - frees.len());
        Ok(out)
    }

    /// Re-index over freshly saved bytes. The security handler is kept.
    fn adopt(&mut self, data: Bytes) -> Result<()> {
        let index = Index::build(&data)?;
        self.encrypt_objid = match index.trailer.get("Encrypt") {
            Some(PDFObject::Ref(r)) => Some(r.objid),
            _ => None,
        };
        self.next_objid = index.next_objid();
        self.data = data;
        self.index = index;
        self.cache.get_mut().clear();
        self.changes.clear();
        self.deleted.clear();
        self.needs_full_rewrite = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble a single-revision file from `(objid, body)` pairs.
    fn build(objects: &[(u32, &str)], trailer: &str) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n".to_vec();
        let mut entries = BTreeMap::new();
        for (objid, body) in objects {
            entries.insert(
                *objid,
                XRefEntry::InUse {
                    offset: out.len(),
                    genno: 0,
                },
            );
            out.extend_from_slice(format!("{objid} 0 obj\n{body}\nendobj\n").as_bytes());
        }
        add_free_list(&mut entries, &[]);
        let pos = out.len();
        write_xref(&mut out, &entries);
        out.extend_from_slice(format!("trailer\n{trailer}\nstartxref\n{pos}\n%%EOF\n").as_bytes());
        out
    }

    fn sample() -> PDFDocument {
        PDFDocument::new(build(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
                (3, "(hello world)"),
            ],
            "<< /Size 4 /Root 1 0 R >>",
        ))
        .unwrap()
    }

    #[test]
    fn loads_header_and_objects() {
        let doc = sample();
        assert_eq!(doc.version(), "1.4");
        assert_eq!(doc.object_ids(), vec![1, 2, 3]);
        assert_eq!(
            *doc.getobj(3).unwrap(),
            PDFObject::String(b"hello world".to_vec())
        );
        assert!(doc.getobj(99).is_none());
    }

    #[test]
    fn missing_header_is_parse_error() {
        assert!(matches!(
            PDFDocument::new(b"not a pdf".to_vec()),
            Err(PdfError::Parse { .. })
        ));
    }

    #[test]
    fn bounded_parse_tolerates_missing_endobj() {
        let mut data = b"%PDF-1.4\n".to_vec();
        let off1 = data.len();
        data.extend_from_slice(b"1 0 obj\n<< /A 1 >>\n");
        let off2 = data.len();
        data.extend_from_slice(b"2 0 obj\n42\nendobj\n");
        let pos = data.len();
        data.extend_from_slice(
            format!(
                "xref\n0 3\n0000000000 65535 f\r\n{off1:010} 00000 n\r\n{off2:010} 00000 n\r\ntrailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n{pos}\n%%EOF\n"
            )
            .as_bytes(),
        );
        let doc = PDFDocument::new(data).unwrap();
        assert_eq!(doc.getobj(1).unwrap().get("A"), Some(&PDFObject::Int(1)));
        assert_eq!(*doc.getobj(2).unwrap(), PDFObject::Int(42));
    }

    #[test]
    fn object_mut_marks_changed_and_copies_on_write() {
        let mut doc = sample();
        let before = doc.getobj(1).unwrap();
        doc.object_mut(1)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .insert("Lang".into(), PDFObject::String(b"en".to_vec()));
        assert_eq!(doc.changes().collect::<Vec<_>>(), vec![1]);
        assert!(before.get("Lang").is_none());
        assert!(doc.getobj(1).unwrap().get("Lang").is_some());
    }

    #[test]
    fn replace_strings_counts_occurrences() {
        let mut doc = sample();
        assert_eq!(doc.replace_strings(b"o", b"0"), 2);
        assert_eq!(
            *doc.getobj(3).unwrap(),
            PDFObject::String(b"hell0 w0rld".to_vec())
        );
    }

    #[test]
    fn unreferenced_objects_are_removed() {
        let mut doc = sample();
        assert_eq!(doc.remove_unreferenced_objects(), 1);
        assert_eq!(doc.object_ids(), vec![1, 2]);
    }

    #[test]
    fn info_is_created_on_demand() {
        let mut doc = sample();
        assert!(doc.info().is_none());
        doc.set_info("Title", PDFObject::String(b"Report".to_vec()));
        doc.set_info("Author", PDFObject::String(b"Ann".to_vec()));
        let info = doc.info().unwrap();
        assert_eq!(info.len(), 2);
        assert!(doc.trailer().contains_key("Info"));
    }

    #[test]
    fn unchanged_incremental_save_is_identity() {
        let mut doc = sample();
        let before = doc.bytes().clone();
        let after = doc.save(&SaveOptions::incremental()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn highest_object_number_does_not_overflow() {
        let mut doc = sample();
        doc.set_object(u32::MAX, PDFObject::Int(1));
        assert_eq!(doc.next_objid, u32::MAX);

        let data = build(&[(1, "<< /Type /Catalog >>")], "<< /Size 2 /Root 1 0 R >>");
        let mut index = Index::build(&data).unwrap();
        index.entries.insert(
            u32::MAX,
            XRefEntry::InUse {
                offset: 9,
                genno: 0,
            },
        );
        assert_eq!(index.next_objid(), u32::MAX);
    }
}
