//! Page tree navigation and editing.
//!
//! Pages are numbered from 1. Navigation descends `Kids` using each
//! subtree's `Count`; edits keep the ancestor `Count`s consistent.

use super::catalog::PDFDocument;
use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, PDFObjRef, PDFObject, PDFStream};
use log::warn;
use rustc_hash::{FxHashMap, FxHashSet};
use std::ops::RangeInclusive;

/// Attributes a page inherits from its ancestors.
pub const INHERITABLE_ATTRIBUTES: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// US Letter, used when no `MediaBox` is found.
pub const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

fn is_leaf(dict: &Dict) -> bool {
    match dict.get("Type").and_then(|t| t.as_name().ok()) {
        Some("Page") => true,
        Some("Pages") => false,
        _ => !dict.contains_key("Kids"),
    }
}

fn refers_to(obj: &PDFObject, objid: u32) -> bool {
    matches!(obj, PDFObject::Ref(r) if r.objid == objid)
}

fn parent_id(dict: &Dict) -> Option<u32> {
    dict.get("Parent")
        .and_then(|p| p.as_ref().ok())
        .map(|r| r.objid)
}

impl PDFDocument {
    /// Object number of the root `Pages` node.
    pub fn pages_root(&self) -> Option<u32> {
        self.catalog()?
            .get("Pages")
            .and_then(|p| p.as_ref().ok())
            .map(|r| r.objid)
    }

    /// Number of pages, from the root node's `Count`.
    pub fn page_count(&self) -> usize {
        let Some(root) = self.pages_root() else {
            return 0;
        };
        let count = self
            .getobj(root)
            .and_then(|obj| obj.get("Count").map(|c| self.resolve(c)))
            .and_then(|c| c.as_int().ok());
        match count {
            Some(n) => usize::try_from(n).unwrap_or(0),
            None => {
                warn!("page tree root has no Count, walking the tree");
                self.page_ids().len()
            }
        }
    }

    /// Page object numbers in document order.
    pub fn page_ids(&self) -> Vec<u32> {
        let mut out = Vec::new();
        let Some(root) = self.pages_root() else {
            return out;
        };
        let mut stack = vec![root];
        let mut visited = FxHashSet::default();
        while let Some(objid) = stack.pop() {
            if !visited.insert(objid) {
                warn!("page tree revisits object {objid}");
                continue;
            }
            let Some(obj) = self.getobj(objid) else {
                continue;
            };
            let Ok(dict) = obj.as_dict() else {
                continue;
            };
            if is_leaf(dict) {
                out.push(objid);
                continue;
            }
            if let Some(kids) = dict.get("Kids").map(|k| self.resolve(k))
                && let Ok(kids) = kids.as_array()
            {
                stack.extend(
                    kids.iter()
                        .rev()
                        .filter_map(|kid| kid.as_ref().ok().map(|r| r.objid)),
                );
            }
        }
        out
    }

    fn subtree_count(&self, objid: u32) -> usize {
        let Some(obj) = self.getobj(objid) else {
            return 0;
        };
        let Ok(dict) = obj.as_dict() else {
            return 0;
        };
        if is_leaf(dict) {
            return 1;
        }
        dict.get("Count")
            .map(|c| self.resolve(c))
            .and_then(|c| c.as_int().ok())
            .and_then(|c| usize::try_from(c).ok())
            .unwrap_or(0)
    }

    /// Object number of page `n` (1-based).
    pub fn page(&self, n: usize) -> Result<u32> {
        if n == 0 {
            return Err(PdfError::PageNotFound(n));
        }
        let mut node = self.pages_root().ok_or(PdfError::PageNotFound(n))?;
        let mut remaining = n;
        let mut visited = FxHashSet::default();
        loop {
            if !visited.insert(node) {
                return Err(PdfError::Structure(format!(
                    "page tree cycle through object {node}"
                )));
            }
            let obj = self.getobj(node).ok_or(PdfError::PageNotFound(n))?;
            let dict = obj.as_dict()?;
            if is_leaf(dict) {
                return if remaining == 1 {
                    Ok(node)
                } else {
                    Err(PdfError::PageNotFound(n))
                };
            }
            let kids = dict
                .get("Kids")
                .map(|k| self.resolve(k))
                .unwrap_or(PDFObject::Array(Vec::new()));
            let mut next = None;
            for kid in kids.as_array()? {
                let Ok(kid) = kid.as_ref() else {
                    continue;
                };
                let count = self.subtree_count(kid.objid);
                if remaining <= count {
                    next = Some(kid.objid);
                    break;
                }
                remaining -= count;
            }
            node = next.ok_or(PdfError::PageNotFound(n))?;
        }
    }

    /// Look up `key` on a page object, climbing `Parent` links for
    /// inheritable attributes.
    pub fn inherited_attribute(&self, objid: u32, key: &str) -> Option<PDFObject> {
        let inheritable = INHERITABLE_ATTRIBUTES.contains(&key);
        let mut node = Some(objid);
        let mut visited = FxHashSet::default();
        while let Some(id) = node {
            if !visited.insert(id) {
                break;
            }
            let obj = self.getobj(id)?;
            let dict = obj.as_dict().ok()?;
            if let Some(value) = dict.get(key) {
                return Some(self.resolve(value));
            }
            if !inheritable {
                return None;
            }
            node = parent_id(dict);
        }
        None
    }

    /// Attribute of page `n`, resolved and inherited where applicable.
    pub fn page_attribute(&self, n: usize, key: &str) -> Option<PDFObject> {
        let objid = self.page(n).ok()?;
        self.inherited_attribute(objid, key)
    }

    /// `MediaBox` of page `n`.
    pub fn media_box(&self, n: usize) -> Option<[f64; 4]> {
        let value = self.page_attribute(n, "MediaBox")?;
        let arr = value.as_array().ok()?;
        if arr.len() != 4 {
            warn!("page {n}: MediaBox has {} entries", arr.len());
            return None;
        }
        let mut rect = [0.0; 4];
        for (slot, item) in rect.iter_mut().zip(arr) {
            *slot = self.resolve(item).as_num().ok()?;
        }
        Some(rect)
    }

    /// Effective `Resources` dictionary of page `n`.
    pub fn page_resources(&self, n: usize) -> Option<Dict> {
        self.page_attribute(n, "Resources")?.as_dict().ok().cloned()
    }

    /// Find a named resource of page `n` in one category (`Font`,
    /// `XObject`, ...).
    pub fn page_resource(&self, n: usize, category: &str, name: &str) -> Option<PDFObject> {
        let resources = self.page_resources(n)?;
        let entries = self.resolve_dict(resources.get(category)?)?;
        entries.get(name).map(|v| self.resolve(v))
    }

    /// Find a named resource of page `n` in any category.
    pub fn get_resource(&self, n: usize, name: &str) -> Option<PDFObject> {
        let resources = self.page_resources(n)?;
        resources.values().find_map(|category| {
            self.resolve_dict(category)?
                .get(name)
                .map(|v| self.resolve(v))
        })
    }

    /// Decoded content of page `n`; multiple streams are joined by a newline.
    pub fn page_content(&self, n: usize) -> Result<Vec<u8>> {
        let objid = self.page(n)?;
        let streams = match self.inherited_attribute(objid, "Contents") {
            Some(PDFObject::Array(items)) => items,
            Some(PDFObject::Null) | None => Vec::new(),
            Some(other) => vec![other],
        };
        let mut out = Vec::new();
        for (i, item) in streams.iter().enumerate() {
            let resolved = self.resolve(item);
            let Ok(stream) = resolved.as_stream() else {
                warn!("page {n}: content entry {i} is a {}", resolved.type_name());
                continue;
            };
            if i > 0 {
                out.push(b'\n');
            }
            out.extend_from_slice(&self.decode_stream(stream));
        }
        Ok(out)
    }

    /// Replace the content of page `n` with one unfiltered stream.
    pub fn set_page_content(&mut self, n: usize, content: &[u8]) -> Result<()> {
        let objid = self.page(n)?;
        let stream = self.add_object(PDFStream::new(Dict::new(), content.to_vec()).into());
        self.page_dict_mut(objid)?
            .insert("Contents".into(), PDFObject::Ref(stream));
        Ok(())
    }

    /// Add a content stream after the existing content of page `n`.
    pub fn append_page_content(&mut self, n: usize, content: &[u8]) -> Result<()> {
        let objid = self.page(n)?;
        let existing = self
            .getobj(objid)
            .and_then(|obj| obj.get("Contents").cloned());
        let stream = PDFObject::Ref(self.add_object(PDFStream::new(Dict::new(), content.to_vec()).into()));
        let contents = match existing {
            None | Some(PDFObject::Null) => stream,
            Some(PDFObject::Array(mut items)) => {
                items.push(stream);
                PDFObject::Array(items)
            }
            Some(single) => match self.resolve(&single) {
                PDFObject::Array(mut items) => {
                    items.push(stream);
                    PDFObject::Array(items)
                }
                _ => PDFObject::Array(vec![single, stream]),
            },
        };
        self.page_dict_mut(objid)?.insert("Contents".into(), contents);
        Ok(())
    }

    /// Delete page `n`. The last remaining page cannot be deleted.
    pub fn delete_page(&mut self, n: usize) -> Result<()> {
        let objid = self.page(n)?;
        if self.page_count() <= 1 {
            return Err(PdfError::Structure("cannot delete the only page".into()));
        }
        self.remove_page_object(objid)
    }

    /// Copy page `n` (inherited attributes materialized, content streams
    /// duplicated) and insert it right after the original. Returns the new
    /// page's number.
    pub fn duplicate_page(&mut self, n: usize) -> Result<usize> {
        let objid = self.page(n)?;
        let mut dict = self.materialized_page(objid)?;
        let parent = parent_id(&dict)
            .ok_or_else(|| PdfError::Structure(format!("page {n} has no Parent")))?;

        if let Some(contents) = dict.get("Contents").cloned() {
            let copied = match self.resolve(&contents) {
                PDFObject::Array(items) => {
                    let mut copies = Vec::with_capacity(items.len());
                    for item in &items {
                        copies.push(self.copy_stream(item));
                    }
                    PDFObject::Array(copies)
                }
                _ => self.copy_stream(&contents),
            };
            dict.insert("Contents".into(), copied);
        }

        let copy = self.add_object(PDFObject::Dict(dict)).objid;
        let kids = self.kids_mut(parent)?;
        let index = kids
            .iter()
            .position(|k| refers_to(k, objid))
            .map_or(kids.len(), |i| i + 1);
        kids.insert(index, PDFObject::Ref(PDFObjRef::new(copy, 0)));
        self.adjust_counts(parent, 1);
        Ok(n + 1)
    }

    /// Keep only the pages in `range` (1-based, inclusive). Returns the
    /// number of pages removed.
    pub fn extract_pages(&mut self, range: RangeInclusive<usize>) -> Result<usize> {
        let count = self.page_count();
        if range.is_empty() || *range.start() == 0 {
            return Err(PdfError::PageNotFound(*range.start()));
        }
        if *range.end() > count {
            return Err(PdfError::PageNotFound(*range.end()));
        }
        let mut removed = 0;
        for (i, objid) in self.page_ids().into_iter().enumerate() {
            if !range.contains(&(i + 1)) {
                self.remove_page_object(objid)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Copy every page of `other` (with everything reachable from it) into
    /// this document before position `at`; `page_count() + 1` appends.
    /// Returns the number of pages inserted.
    pub fn insert_pages(&mut self, other: &PDFDocument, at: usize) -> Result<usize> {
        let count = self.page_count();
        if at == 0 || at > count + 1 {
            return Err(PdfError::PageNotFound(at));
        }
        let pages = other.page_ids();
        let root = self
            .pages_root()
            .ok_or_else(|| PdfError::Structure("document has no page tree".into()))?;
        let source_pages: FxHashSet<u32> = pages.iter().copied().collect();

        let mut map: FxHashMap<u32, u32> = FxHashMap::default();
        for &page in &pages {
            map.insert(page, self.add_object(PDFObject::Null).objid);
        }
        let mut queue = pages.clone();
        while let Some(src) = queue.pop() {
            let dst = map[&src];
            let mut value = if source_pages.contains(&src) {
                let mut dict = other.materialized_page(src)?;
                dict.shift_remove("Parent");
                PDFObject::Dict(dict)
            } else {
                other.getobj(src).map_or(PDFObject::Null, |o| (*o).clone())
            };
            value.map_refs(&mut |r| {
                let target = match map.get(&r.objid) {
                    Some(&target) => target,
                    // Intermediate tree nodes of the source fold into our root.
                    None if other.is_page_tree_node(r.objid) => root,
                    None => {
                        let target = self.add_object(PDFObject::Null).objid;
                        map.insert(r.objid, target);
                        queue.push(r.objid);
                        target
                    }
                };
                *r = PDFObjRef::new(target, 0);
            });
            self.set_object(dst, value);
        }

        for (i, page) in pages.iter().enumerate() {
            self.insert_leaf(map[page], at + i)?;
        }
        Ok(pages.len())
    }

    /// Insert an empty page before position `at`. Returns its object number.
    pub fn insert_blank_page(&mut self, at: usize, media_box: [f64; 4]) -> Result<u32> {
        let count = self.page_count();
        if at == 0 || at > count + 1 {
            return Err(PdfError::PageNotFound(at));
        }
        let mut dict = Dict::new();
        dict.insert("Type".into(), PDFObject::name("Page"));
        dict.insert(
            "MediaBox".into(),
            PDFObject::Array(media_box.iter().map(|v| PDFObject::Real(*v)).collect()),
        );
        dict.insert("Resources".into(), PDFObject::Dict(Dict::new()));
        let objid = self.add_object(PDFObject::Dict(dict)).objid;
        self.insert_leaf(objid, at)?;
        Ok(objid)
    }

    // === helpers ===

    fn is_page_tree_node(&self, objid: u32) -> bool {
        self.getobj(objid)
            .and_then(|obj| obj.get("Type").and_then(|t| t.as_name().ok().map(|t| t == "Pages")))
            .unwrap_or(false)
    }

    /// Page dictionary with inherited attributes copied in.
    fn materialized_page(&self, objid: u32) -> Result<Dict> {
        let obj = self.getobj(objid).ok_or(PdfError::ObjectNotFound(objid))?;
        let mut dict = obj.as_dict()?.clone();
        for key in INHERITABLE_ATTRIBUTES {
            if !dict.contains_key(key)
                && let Some(value) = self.inherited_attribute(objid, key)
            {
                dict.insert(key.to_string(), value);
            }
        }
        Ok(dict)
    }

    /// Duplicate a content stream into a new object; non-streams pass through.
    fn copy_stream(&mut self, item: &PDFObject) -> PDFObject {
        match self.resolve(item) {
            PDFObject::Stream(stream) => PDFObject::Ref(self.add_object(PDFObject::Stream(stream))),
            _ => item.clone(),
        }
    }

    fn page_dict_mut(&mut self, objid: u32) -> Result<&mut Dict> {
        self.object_mut(objid)
            .ok_or(PdfError::ObjectNotFound(objid))?
            .as_dict_mut()
    }

    /// The `Kids` array of a tree node, following an indirect array.
    fn kids_mut(&mut self, node: u32) -> Result<&mut Vec<PDFObject>> {
        let indirect = match self.getobj(node).and_then(|obj| obj.get("Kids").cloned()) {
            Some(PDFObject::Ref(r)) => Some(r.objid),
            Some(_) => None,
            None => return Err(PdfError::KeyError("Kids".into())),
        };
        match indirect {
            Some(objid) => self
                .object_mut(objid)
                .ok_or(PdfError::ObjectNotFound(objid))?
                .as_array_mut(),
            None => self
                .page_dict_mut(node)?
                .get_mut("Kids")
                .ok_or_else(|| PdfError::KeyError("Kids".into()))?
                .as_array_mut(),
        }
    }

    /// Add `delta` to `Count` on `start` and every ancestor.
    fn adjust_counts(&mut self, start: u32, delta: i64) {
        let mut node = Some(start);
        let mut visited = FxHashSet::default();
        while let Some(objid) = node {
            if !visited.insert(objid) {
                break;
            }
            let count = self
                .getobj(objid)
                .and_then(|obj| obj.get("Count").map(|c| self.resolve(c)))
                .and_then(|c| c.as_int().ok())
                .unwrap_or(0);
            let Ok(dict) = self.page_dict_mut(objid) else {
                break;
            };
            dict.insert("Count".into(), PDFObject::Int((count + delta).max(0)));
            node = parent_id(dict);
        }
    }

    /// Unlink a page from its parent, fix counts and delete the object.
    fn remove_page_object(&mut self, objid: u32) -> Result<()> {
        let parent = self
            .getobj(objid)
            .and_then(|obj| obj.as_dict().ok().and_then(parent_id))
            .ok_or_else(|| PdfError::Structure(format!("page object {objid} has no Parent")))?;
        self.kids_mut(parent)?.retain(|k| !refers_to(k, objid));
        self.adjust_counts(parent, -1);
        self.delete_object(objid);
        Ok(())
    }

    /// Link an existing page object into the tree before position `at`.
    fn insert_leaf(&mut self, leaf: u32, at: usize) -> Result<()> {
        let count = self.page_count();
        let (parent, anchor) = if count == 0 {
            let root = self
                .pages_root()
                .ok_or_else(|| PdfError::Structure("document has no page tree".into()))?;
            (root, None)
        } else {
            let (anchor, after) = if at <= count {
                (self.page(at)?, false)
            } else {
                (self.page(count)?, true)
            };
            let parent = self
                .getobj(anchor)
                .and_then(|obj| obj.as_dict().ok().and_then(parent_id))
                .ok_or_else(|| PdfError::Structure(format!("page object {anchor} has no Parent")))?;
            (parent, Some((anchor, after)))
        };

        let kids = self.kids_mut(parent)?;
        let index = match anchor {
            Some((anchor, after)) => kids
                .iter()
                .position(|k| refers_to(k, anchor))
                .map_or(kids.len(), |i| i + usize::from(after)),
            None => kids.len(),
        };
        kids.insert(index, PDFObject::Ref(PDFObjRef::new(leaf, 0)));
        self.page_dict_mut(leaf)?
            .insert("Parent".into(), PDFObject::Ref(PDFObjRef::new(parent, 0)));
        self.adjust_counts(parent, 1);
        Ok(())
    }
}
