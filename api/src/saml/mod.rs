/*
 * SPDX-FileCopyrightText: Copyright (c) 2021-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

/*!
 *  SAML 2.0 assertion rendering for trust reports.
 *
 *  The assertion is written directly in exclusive-canonical form (no
 *  whitespace between elements, explicit end tags, namespace declarations
 *  ahead of attributes, attributes in lexical order), so the bytes that are
 *  digested are the bytes that are returned and no separate C14N pass is
 *  needed. The enveloped signature sits right after the Issuer.
*/

use std::borrow::Cow;
use std::sync::Arc;

use base64::prelude::*;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::Writer;
use sha2::{Digest, Sha256};

use crate::model::host_manifest::HostInfo;
use crate::verifier::trust_report::TrustReport;
use crate::{HvsError, HvsResult};

pub mod signing_key;

pub use signing_key::{FileSigningKeyProvider, SigningKey, SigningKeyProvider};

pub const SAML_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
pub const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
const SHA256_DIGEST: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
const NAMEID_UNSPECIFIED: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified";
const SENDER_VOUCHES: &str = "urn:oasis:names:tc:SAML:2.0:cm:sender-vouches";

pub const TRUST_OVERALL_ATTRIBUTE: &str = "TRUST_OVERALL";

/// escape_text escapes character data the way canonical XML does.
fn escape_text(raw: &str) -> Cow<'_, str> {
    let escaped = quick_xml::escape::partial_escape(raw);
    if escaped.contains('\r') {
        Cow::Owned(escaped.replace('\r', "&#xD;"))
    } else {
        escaped
    }
}

/// escape_attribute escapes an attribute value the way canonical XML does.
/// quick-xml's own attribute escaping also rewrites `>` and `'`, which
/// canonical XML leaves alone.
fn escape_attribute(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            other => out.push(other),
        }
    }
    out
}

/// CanonicalWriter drives a quick-xml writer in canonical form: no
/// indentation and an explicit end tag for every element. Attributes must
/// be passed in the order canonical XML requires.
struct CanonicalWriter {
    writer: Writer<Vec<u8>>,
}

impl CanonicalWriter {
    fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
        }
    }

    fn open(&mut self, name: &str, attributes: &[(&str, &str)]) -> HvsResult<&mut Self> {
        let mut start = BytesStart::new(name);
        for (key, value) in attributes {
            start.push_attribute(Attribute {
                key: QName(key.as_bytes()),
                value: Cow::Owned(escape_attribute(value).into_bytes()),
            });
        }
        self.writer.write_event(Event::Start(start))?;
        Ok(self)
    }

    fn close(&mut self, name: &str) -> HvsResult<&mut Self> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(self)
    }

    fn text(&mut self, text: &str) -> HvsResult<&mut Self> {
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(escape_text(text))))?;
        Ok(self)
    }

    /// raw appends markup that is already canonical.
    fn raw(&mut self, markup: &str) -> &mut Self {
        self.writer.get_mut().extend_from_slice(markup.as_bytes());
        self
    }

    fn element(
        &mut self,
        name: &str,
        attributes: &[(&str, &str)],
        text: &str,
    ) -> HvsResult<&mut Self> {
        self.open(name, attributes)?.text(text)?.close(name)
    }

    /// empty writes `<name ...></name>`, the canonical form of an empty
    /// element.
    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> HvsResult<&mut Self> {
        self.open(name, attributes)?.close(name)
    }

    fn finish(self) -> HvsResult<String> {
        String::from_utf8(self.writer.into_inner())
            .map_err(|e| HvsError::SamlError(format!("assertion is not UTF-8: {e}")))
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// SamlIssuer renders and signs trust report assertions.
pub struct SamlIssuer {
    issuer: String,
    key_provider: Arc<dyn SigningKeyProvider>,
}

impl SamlIssuer {
    pub fn new(issuer: String, key_provider: Arc<dyn SigningKeyProvider>) -> Self {
        Self {
            issuer,
            key_provider,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// attributes lists the AttributeStatement of an assertion: the
    /// flattened host info, one TRUST_<PART> per evaluated part and
    /// TRUST_OVERALL last.
    pub fn attributes(trust_report: &TrustReport, host_info: &HostInfo) -> Vec<(String, String)> {
        let mut attributes: Vec<(String, String)> = host_info.flatten().into_iter().collect();
        attributes.extend(
            trust_report
                .parts
                .iter()
                .map(|(part, trust)| (format!("TRUST_{part}"), trust.trusted.to_string())),
        );
        attributes.push((
            TRUST_OVERALL_ATTRIBUTE.to_string(),
            trust_report.overall.to_string(),
        ));
        attributes
    }

    pub fn render(
        &self,
        trust_report: &TrustReport,
        host_info: &HostInfo,
        now: DateTime<Utc>,
        validity: Duration,
    ) -> HvsResult<String> {
        let key = self.key_provider.signing_key()?;
        let assertion_id = format!("HVS_{}", uuid::Uuid::new_v4());
        let issue_instant = timestamp(now);
        let not_before = timestamp(now);
        let not_on_or_after = timestamp(now + validity);

        let mut head = CanonicalWriter::new();
        head.open(
            "saml2:Assertion",
            &[
                ("xmlns:saml2", SAML_NS),
                ("ID", assertion_id.as_str()),
                ("IssueInstant", issue_instant.as_str()),
                ("Version", "2.0"),
            ],
        )?
        .element("saml2:Issuer", &[], &self.issuer)?;
        let head = head.finish()?;

        let validity_window = [
            ("NotBefore", not_before.as_str()),
            ("NotOnOrAfter", not_on_or_after.as_str()),
        ];
        let mut tail = CanonicalWriter::new();
        tail.open("saml2:Subject", &[])?
            .element(
                "saml2:NameID",
                &[("Format", NAMEID_UNSPECIFIED)],
                &host_info.host_name,
            )?
            .open("saml2:SubjectConfirmation", &[("Method", SENDER_VOUCHES)])?
            .empty("saml2:SubjectConfirmationData", &validity_window)?
            .close("saml2:SubjectConfirmation")?
            .close("saml2:Subject")?
            .empty("saml2:Conditions", &validity_window)?
            .open("saml2:AttributeStatement", &[])?;
        for (name, value) in Self::attributes(trust_report, host_info) {
            tail.open("saml2:Attribute", &[("Name", name.as_str())])?
                .element("saml2:AttributeValue", &[], &value)?
                .close("saml2:Attribute")?;
        }
        tail.close("saml2:AttributeStatement")?
            .close("saml2:Assertion")?;
        let tail = tail.finish()?;

        // The enveloped-signature transform removes the Signature element,
        // leaving exactly head + tail.
        let digest = Sha256::digest(format!("{head}{tail}").as_bytes());
        let digest_value = BASE64_STANDARD.encode(digest);

        let signed_info = render_signed_info(&assertion_id, &digest_value, true)?;
        let signature_value = BASE64_STANDARD.encode(key.sign(signed_info.as_bytes())?);

        let mut signature = CanonicalWriter::new();
        signature
            .open("ds:Signature", &[("xmlns:ds", DSIG_NS)])?
            .raw(&render_signed_info(&assertion_id, &digest_value, false)?)
            .element("ds:SignatureValue", &[], &signature_value)?
            .open("ds:KeyInfo", &[])?
            .open("ds:X509Data", &[])?
            .element(
                "ds:X509Certificate",
                &[],
                &BASE64_STANDARD.encode(key.certificate_der()),
            )?
            .close("ds:X509Data")?
            .close("ds:KeyInfo")?
            .close("ds:Signature")?;
        let signature = signature.finish()?;

        tracing::debug!(
            assertion_id = %assertion_id,
            host_name = %host_info.host_name,
            overall = trust_report.overall,
            "Rendered SAML assertion"
        );

        Ok(format!("{head}{signature}{tail}"))
    }
}

/// render_signed_info renders the SignedInfo element. Exclusive C14N of
/// SignedInfo on its own carries the ds namespace declaration, which is
/// what gets signed; inside the Signature element it is inherited instead.
fn render_signed_info(
    assertion_id: &str,
    digest_value: &str,
    standalone: bool,
) -> HvsResult<String> {
    let reference = format!("#{assertion_id}");
    let mut writer = CanonicalWriter::new();
    if standalone {
        writer.open("ds:SignedInfo", &[("xmlns:ds", DSIG_NS)])?;
    } else {
        writer.open("ds:SignedInfo", &[])?;
    }
    writer
        .empty("ds:CanonicalizationMethod", &[("Algorithm", EXC_C14N)])?
        .empty("ds:SignatureMethod", &[("Algorithm", RSA_SHA256)])?
        .open("ds:Reference", &[("URI", reference.as_str())])?
        .open("ds:Transforms", &[])?
        .empty("ds:Transform", &[("Algorithm", ENVELOPED_SIGNATURE)])?
        .empty("ds:Transform", &[("Algorithm", EXC_C14N)])?
        .close("ds:Transforms")?
        .empty("ds:DigestMethod", &[("Algorithm", SHA256_DIGEST)])?
        .element("ds:DigestValue", &[], digest_value)?
        .close("ds:Reference")?
        .close("ds:SignedInfo")?;
    writer.finish()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};

    use super::*;
    use crate::model::flavor::FlavorPart;
    use crate::verifier::trust_report::PartTrust;

    fn between<'a>(xml: &'a str, start: &str, end: &str) -> &'a str {
        let from = xml.find(start).unwrap();
        let to = xml[from..].find(end).unwrap() + from + end.len();
        &xml[from..to]
    }

    fn inner<'a>(xml: &'a str, tag: &str) -> &'a str {
        let open = format!("<{tag}>");
        let from = xml.find(&open).unwrap() + open.len();
        let to = xml[from..].find(&format!("</{tag}>")).unwrap() + from;
        &xml[from..to]
    }

    /// verify checks both the reference digest and the signature of an
    /// assertion rendered by SamlIssuer.
    fn verify(xml: &str, public_key: &RsaPublicKey) -> bool {
        let signature = between(xml, "<ds:Signature ", "</ds:Signature>");
        let unsigned = xml.replacen(signature, "", 1);
        let digest = BASE64_STANDARD.encode(Sha256::digest(unsigned.as_bytes()));
        if digest != inner(signature, "ds:DigestValue") {
            return false;
        }

        let signed_info = between(signature, "<ds:SignedInfo>", "</ds:SignedInfo>").replacen(
            "<ds:SignedInfo>",
            &format!("<ds:SignedInfo xmlns:ds=\"{DSIG_NS}\">"),
            1,
        );
        let signature_value = BASE64_STANDARD
            .decode(inner(signature, "ds:SignatureValue"))
            .unwrap();
        public_key
            .verify(
                Pkcs1v15Sign::new::<Sha256>(),
                &Sha256::digest(signed_info.as_bytes()),
                &signature_value,
            )
            .is_ok()
    }

    fn issuer() -> (SamlIssuer, RsaPublicKey) {
        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let key = SigningKey::new(private_key, vec![1, 2, 3]);
        (
            SamlIssuer::new("https://hvs.example.com".to_string(), Arc::new(key)),
            public_key,
        )
    }

    fn report() -> TrustReport {
        let mut parts = BTreeMap::new();
        parts.insert(
            FlavorPart::Os,
            PartTrust {
                trusted: true,
                counted: true,
                match_policies: Vec::new(),
                flavors: Vec::new(),
                faults: Vec::new(),
            },
        );
        TrustReport::from_parts(parts)
    }

    fn host_info() -> HostInfo {
        HostInfo {
            host_name: "host-a & <b>".to_string(),
            os_name: "RedHatEnterpriseServer".to_string(),
            os_version: "7.4".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_assertion_signature_verifies() {
        let (issuer, public_key) = issuer();
        let now = Utc::now();
        let xml = issuer
            .render(&report(), &host_info(), now, Duration::hours(24))
            .unwrap();
        assert!(verify(&xml, &public_key));

        let tampered = xml.replacen(
            "<saml2:Attribute Name=\"TRUST_OVERALL\"><saml2:AttributeValue>true",
            "<saml2:Attribute Name=\"TRUST_OVERALL\"><saml2:AttributeValue>false",
            1,
        );
        assert_ne!(tampered, xml);
        assert!(!verify(&tampered, &public_key));
    }

    #[test]
    fn test_assertion_content() {
        let (issuer, _) = issuer();
        let now = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let xml = issuer
            .render(&report(), &host_info(), now, Duration::hours(24))
            .unwrap();

        assert!(xml.starts_with("<saml2:Assertion xmlns:saml2="));
        assert!(xml.contains("<saml2:Issuer>https://hvs.example.com</saml2:Issuer><ds:Signature"));
        assert!(xml.contains("host-a &amp; &lt;b&gt;</saml2:NameID>"));
        assert!(xml.contains(
            "<saml2:Conditions NotBefore=\"2024-03-01T10:00:00.000Z\" NotOnOrAfter=\"2024-03-02T10:00:00.000Z\"></saml2:Conditions>"
        ));
        assert!(xml.contains(
            "<saml2:Attribute Name=\"TRUST_OS\"><saml2:AttributeValue>true</saml2:AttributeValue></saml2:Attribute>"
        ));
        assert!(xml.contains(
            "<saml2:Attribute Name=\"os_version\"><saml2:AttributeValue>7.4</saml2:AttributeValue></saml2:Attribute>"
        ));
        assert!(xml.contains("<ds:X509Certificate>AQID</ds:X509Certificate>"));
    }

    #[test]
    fn test_attribute_order() {
        let names: Vec<_> = SamlIssuer::attributes(&report(), &host_info())
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names.last().unwrap(), TRUST_OVERALL_ATTRIBUTE);
        assert!(names.contains(&"TRUST_OS".to_string()));
        assert!(names.contains(&"host_name".to_string()));
    }

    #[test]
    fn test_canonical_writer_output() {
        let mut writer = CanonicalWriter::new();
        writer
            .open("a:Root", &[("xmlns:a", "urn:a"), ("Name", "x > 'y' & \"z\"")])
            .unwrap()
            .empty("a:Empty", &[])
            .unwrap()
            .element("a:Text", &[], "1 < 2\r")
            .unwrap()
            .close("a:Root")
            .unwrap();
        assert_eq!(
            writer.finish().unwrap(),
            "<a:Root xmlns:a=\"urn:a\" Name=\"x > 'y' &amp; &quot;z&quot;\">\
             <a:Empty></a:Empty><a:Text>1 &lt; 2&#xD;</a:Text></a:Root>"
        );
    }

    #[test]
    fn test_escaping() {
        assert_eq!(escape_text("a&b<c>\"d\""), "a&amp;b&lt;c&gt;\"d\"");
        assert_eq!(escape_attribute("a\"b\n<c>"), "a&quot;b&#xA;&lt;c>");
    }
}
