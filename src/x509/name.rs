// secure-attend: PKI-backed access control and attendance core.
// Copyright 2026 The SecureAttend Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use super::{Error, Result};
use const_oid::ObjectIdentifier;
use der::Tag;
use der::asn1::{Any, SetOfVec};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};

/// OID for CommonName (2.5.4.3).
pub(super) const OID_CN: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
/// OID for CountryName (2.5.4.6).
pub(super) const OID_C: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
/// OID for LocalityName (2.5.4.7).
pub(super) const OID_L: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
/// OID for StateOrProvinceName (2.5.4.8).
pub(super) const OID_ST: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
/// OID for OrganizationName (2.5.4.10).
pub(super) const OID_O: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
/// OID for OrganizationalUnitName (2.5.4.11).
pub(super) const OID_OU: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
/// OID for emailAddress (PKCS#9, 1.2.840.113549.1.9.1).
pub(super) const OID_EMAIL: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");

/// A DN attribute value encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NameValue {
    /// UTF8String value.
    Utf8(String),
    /// PrintableString value (restricted ASCII subset from RFC 5280).
    Printable(String),
    /// IA5String value (7-bit ASCII).
    Ia5(String),
}

impl NameValue {
    fn as_any(&self) -> Result<Any> {
        match self {
            NameValue::Utf8(value) => Ok(Any::new(Tag::Utf8String, value.as_bytes())?),
            NameValue::Printable(value) => {
                if !is_printable_string(value) {
                    return Err(Error::InvalidPrintableString);
                }
                Ok(Any::new(Tag::PrintableString, value.as_bytes())?)
            }
            NameValue::Ia5(value) => {
                if !value.is_ascii() {
                    return Err(Error::InvalidIa5String);
                }
                Ok(Any::new(Tag::Ia5String, value.as_bytes())?)
            }
        }
    }
}

fn is_printable_string(value: &str) -> bool {
    value.as_bytes().iter().all(|b| {
        b.is_ascii_alphanumeric()
            || matches!(
                *b,
                b' ' | b'\'' | b'(' | b')' | b'+' | b',' | b'-' | b'.' | b'/' | b':' | b'=' | b'?'
            )
    })
}

/// A single DN attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameAttribute {
    /// Attribute OID (for example `2.5.4.3` for CN).
    pub oid: ObjectIdentifier,
    /// Encoded attribute value.
    pub value: NameValue,
}

/// Distinguished Name represented as ordered attributes.
///
/// The builder helpers cover the attribute set the system issues;
/// attribute order is preserved into the encoded RDN sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    /// Ordered list of RDN attributes.
    pub attrs: Vec<NameAttribute>,
}

impl DistinguishedName {
    /// Creates an empty DN.
    pub fn new() -> Self {
        Self { attrs: Vec::new() }
    }

    /// Adds a PrintableString country attribute (two-letter ISO code).
    pub fn country(self, value: impl Into<String>) -> Self {
        self.push(OID_C, NameValue::Printable(value.into()))
    }

    /// Adds a UTF8String state/province attribute.
    pub fn state(self, value: impl Into<String>) -> Self {
        self.push(OID_ST, NameValue::Utf8(value.into()))
    }

    /// Adds a UTF8String locality attribute.
    pub fn locality(self, value: impl Into<String>) -> Self {
        self.push(OID_L, NameValue::Utf8(value.into()))
    }

    /// Adds a UTF8String organization attribute.
    pub fn organization(self, value: impl Into<String>) -> Self {
        self.push(OID_O, NameValue::Utf8(value.into()))
    }

    /// Adds a UTF8String organizational unit attribute.
    pub fn organizational_unit(self, value: impl Into<String>) -> Self {
        self.push(OID_OU, NameValue::Utf8(value.into()))
    }

    /// Adds a UTF8String common name attribute.
    pub fn common_name(self, value: impl Into<String>) -> Self {
        self.push(OID_CN, NameValue::Utf8(value.into()))
    }

    /// Adds an IA5String emailAddress attribute.
    pub fn email(self, value: impl Into<String>) -> Self {
        self.push(OID_EMAIL, NameValue::Ia5(value.into()))
    }

    /// Adds an arbitrary attribute.
    pub fn push(mut self, oid: ObjectIdentifier, value: NameValue) -> Self {
        self.attrs.push(NameAttribute { oid, value });
        self
    }

    /// Encodes the DN as an X.501 RDN sequence, one attribute per RDN.
    pub(crate) fn to_x509_name(&self) -> Result<Name> {
        let mut rdns = Vec::with_capacity(self.attrs.len());
        for attr in &self.attrs {
            let mut set = SetOfVec::new();
            set.insert(AttributeTypeAndValue {
                oid: attr.oid,
                value: attr.value.as_any()?,
            })
            .expect("single ATAV per RDN must be unique");
            rdns.push(RelativeDistinguishedName::from(set));
        }
        Ok(RdnSequence(rdns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use der::Encode;

    #[test]
    fn test_builder_preserves_order() {
        let dn = DistinguishedName::new()
            .country("US")
            .organization("College")
            .common_name("student_s1");
        assert_eq!(dn.attrs.len(), 3);
        assert_eq!(dn.attrs[0].oid, OID_C);
        assert_eq!(dn.attrs[2].oid, OID_CN);
    }

    #[test]
    fn test_encode_roundtrips_through_der() {
        let dn = DistinguishedName::new()
            .organization("College")
            .organizational_unit("Students")
            .common_name("student_s1")
            .email("s1@example.edu");
        let name = dn.to_x509_name().unwrap();
        assert!(!name.to_der().unwrap().is_empty());
    }

    #[test]
    fn test_country_rejects_non_printable() {
        let dn = DistinguishedName::new().country("Ü?");
        assert!(matches!(
            dn.to_x509_name(),
            Err(Error::InvalidPrintableString)
        ));
    }

    #[test]
    fn test_email_rejects_non_ascii() {
        let dn = DistinguishedName::new().email("pädagoge@example.edu");
        assert!(matches!(dn.to_x509_name(), Err(Error::InvalidIa5String)));
    }
}
