//! Standard security handler: known-answer checks and encrypted documents.

mod common;

use common::{contains, count_xref_sections, encrypted_pdf};
use folio_core::document::{
    OpenOptions, PDFDocument, Permissions, SaveOptions, SecurityHandler, decode_permissions,
    encode_permissions,
};
use folio_core::error::PdfError;
use folio_core::model::objects::{Dict, PDFObject};

// rc4-40.pdf: V=1, R=2, 40-bit key, password "foo"
const RC4_40_P: i64 = -4;
const RC4_40_O: [u8; 32] = [
    1, 169, 240, 206, 242, 141, 0, 248, 223, 176, 37, 143, 94, 240, 197, 92, 157, 247, 200, 22,
    149, 143, 54, 49, 0, 175, 119, 236, 2, 38, 36, 84,
];
const RC4_40_U: [u8; 32] = [
    105, 75, 157, 162, 248, 9, 199, 124, 114, 119, 140, 251, 202, 194, 4, 129, 178, 114, 5, 208,
    231, 211, 34, 98, 54, 130, 131, 100, 102, 106, 151, 8,
];
const RC4_40_DOCID: [u8; 16] = [
    101, 26, 148, 254, 235, 120, 104, 211, 18, 169, 123, 55, 114, 112, 134, 14,
];

fn rc4_40_dict(v: i64) -> Dict {
    let mut dict = Dict::new();
    dict.insert("Filter".into(), PDFObject::name("Standard"));
    dict.insert("V".into(), PDFObject::Int(v));
    dict.insert("R".into(), PDFObject::Int(2));
    dict.insert("Length".into(), PDFObject::Int(40));
    dict.insert("P".into(), PDFObject::Int(RC4_40_P));
    dict.insert("O".into(), PDFObject::String(RC4_40_O.to_vec()));
    dict.insert("U".into(), PDFObject::String(RC4_40_U.to_vec()));
    dict
}

fn title(doc: &PDFDocument) -> Option<Vec<u8>> {
    doc.info()?.get("Title")?.as_string().ok().map(<[u8]>::to_vec)
}

fn print_only() -> Permissions {
    Permissions {
        print: true,
        ..Permissions::NONE
    }
}

#[test]
fn test_rc4_40_known_answer() {
    let handler = SecurityHandler::open(&rc4_40_dict(1), &RC4_40_DOCID, b"", b"foo")
        .expect("correct password authenticates");
    assert_eq!(handler.file_key().len(), 5);
    assert_eq!(handler.p(), -4);
    assert!(handler.permissions().print);

    for wrong in [&b"bar"[..], b""] {
        assert!(matches!(
            SecurityHandler::open(&rc4_40_dict(1), &RC4_40_DOCID, b"", wrong),
            Err(PdfError::WrongPassword)
        ));
    }
}

#[test]
fn test_unsupported_handler_versions() {
    assert!(matches!(
        SecurityHandler::check_supported(&rc4_40_dict(2)),
        Err(PdfError::UnsupportedEncryption(_))
    ));
    let mut public_key = rc4_40_dict(1);
    public_key.insert("Filter".into(), PDFObject::name("Adobe.PubSec"));
    assert!(matches!(
        SecurityHandler::check_supported(&public_key),
        Err(PdfError::UnsupportedEncryption(_))
    ));
}

#[test]
fn test_permission_codec() {
    assert_eq!(encode_permissions(true, true, true, true), -4);
    assert_eq!(encode_permissions(false, false, false, false), -64);
    assert_eq!(encode_permissions(true, false, false, false), -60);
    let decoded = decode_permissions(encode_permissions(false, true, false, true));
    assert_eq!(
        decoded,
        Permissions {
            print: false,
            modify: true,
            copy: false,
            add: true
        }
    );
}

#[test]
fn test_encrypted_round_trip() {
    let data = encrypted_pdf("owner", "user", print_only());
    assert!(!contains(&data, b"Fixture"));
    assert!(!contains(&data, b"Page one"));
    assert!(contains(&data, b"/Encrypt"));

    let options = OpenOptions::default().with_user_password("user");
    let doc = PDFDocument::open(data.clone(), &options).expect("user password opens");
    assert!(doc.is_encrypted());
    assert!(!doc.owner_authenticated());
    assert_eq!(doc.permissions(), print_only());
    assert_eq!(title(&doc).as_deref(), Some(&b"Fixture"[..]));
    let content = doc.page_content(1).expect("content decrypts");
    assert!(contains(&content, b"(Page one) Tj"));

    let options = OpenOptions::default().with_owner_password("owner");
    let doc = PDFDocument::open(data, &options).expect("owner password opens");
    assert!(doc.owner_authenticated());
    assert_eq!(title(&doc).as_deref(), Some(&b"Fixture"[..]));
}

#[test]
fn test_wrong_password_is_distinguishable() {
    let data = encrypted_pdf("owner", "user", Permissions::ALL);
    assert!(matches!(PDFDocument::new(data.clone()), Err(PdfError::WrongPassword)));

    let options = OpenOptions::default().with_passwords("nope", "nope");
    assert!(matches!(
        PDFDocument::open(data.clone(), &options),
        Err(PdfError::WrongPassword)
    ));

    // Same length, so the file stays consistent.
    let mut unsupported = data;
    let at = unsupported
        .windows(4)
        .position(|w| w == b"/V 1")
        .expect("encrypt dict present");
    unsupported[at + 3] = b'4';
    assert!(matches!(
        PDFDocument::new(unsupported),
        Err(PdfError::UnsupportedEncryption(_))
    ));
}

#[test]
fn test_interactive_prompt_is_bounded() {
    let data = encrypted_pdf("owner", "user", Permissions::ALL);
    let options = OpenOptions::default().with_max_password_attempts(3);

    let mut asked = Vec::new();
    let mut prompt = |attempt: u32| {
        asked.push(attempt);
        let user = if attempt == 2 { "user" } else { "guess" };
        Some((String::new(), user.to_string()))
    };
    let doc = PDFDocument::open_with_prompt(data.clone(), &options, &mut prompt)
        .expect("second prompt succeeds");
    assert!(doc.is_encrypted());
    assert_eq!(asked, vec![1, 2]);

    let mut calls = 0;
    let mut never = |_: u32| {
        calls += 1;
        Some(("x".to_string(), "y".to_string()))
    };
    assert!(matches!(
        PDFDocument::open_with_prompt(data, &options, &mut never),
        Err(PdfError::WrongPassword)
    ));
    assert_eq!(calls, 3);
}

#[test]
fn test_incremental_edit_of_encrypted_document() {
    let data = encrypted_pdf("owner", "user", Permissions::ALL);
    let options = OpenOptions::default().with_owner_password("owner");
    let mut doc = PDFDocument::open(data, &options).expect("opens");
    doc.set_info("Title", PDFObject::String(b"Confidential".to_vec()));
    let saved = doc.save(&SaveOptions::incremental()).expect("save");
    assert_eq!(count_xref_sections(&saved), 2);
    assert!(!contains(&saved, b"Confidential"));

    let reopened = PDFDocument::open(saved, &OpenOptions::default().with_user_password("user"))
        .expect("reopens");
    assert_eq!(title(&reopened).as_deref(), Some(&b"Confidential"[..]));
}

#[test]
fn test_password_change_requires_owner_and_forces_full_rewrite() {
    let data = encrypted_pdf("owner", "user", Permissions::ALL);

    let as_user = OpenOptions::default().with_user_password("user");
    let mut doc = PDFDocument::open(data.clone(), &as_user).expect("opens");
    assert!(matches!(
        doc.set_passwords("a", "b"),
        Err(PdfError::PermissionDenied(_))
    ));
    assert!(matches!(
        doc.set_permissions(Permissions::NONE),
        Err(PdfError::PermissionDenied(_))
    ));

    let as_owner = OpenOptions::default().with_owner_password("owner");
    let mut doc = PDFDocument::open(data, &as_owner).expect("opens");
    doc.set_passwords("new-owner", "new-user").expect("owner may change passwords");
    doc.set_permissions(print_only()).expect("owner may change permissions");
    let saved = doc.save(&SaveOptions::incremental()).expect("save");
    assert_eq!(count_xref_sections(&saved), 1);

    assert!(matches!(
        PDFDocument::open(saved.clone(), &as_user),
        Err(PdfError::WrongPassword)
    ));
    let doc = PDFDocument::open(saved, &OpenOptions::default().with_user_password("new-user"))
        .expect("new user password opens");
    assert_eq!(doc.permissions(), print_only());
    assert_eq!(title(&doc).as_deref(), Some(&b"Fixture"[..]));
    assert!(contains(&doc.page_content(3).expect("content"), b"Page three"));
}
