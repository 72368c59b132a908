//! `FileObjectType` / `WindowsFileObjectType` decoder
//!
//! One indicator per recognised hash. Each hash indicator points at the
//! other hashes of the same file and carries the file's basic properties.

use crate::indicator::{Attributes, Indicator, IndicatorKind};
use crate::xml::Element;

fn basic_properties(props: &Element) -> Attributes {
    let mut result = Attributes::new();

    for (child, name) in [
        ("File_Name", "stix_file_name"),
        ("File_Size", "stix_file_size"),
        ("File_Format", "stix_file_format"),
    ] {
        if let Some(text) = props.child(child).and_then(Element::non_empty_text) {
            result.insert(name.to_string(), text.into());
        }
    }

    result
}

pub fn decode(props: &Element) -> Vec<Indicator> {
    let mut result = Vec::new();

    for hash in props.find_all("Hash") {
        let Some(kind) = hash
            .find("Type")
            .map(|t| t.text())
            .and_then(|t| IndicatorKind::from_hash_type(&t))
        else {
            continue;
        };

        let Some(value) = hash.find("Simple_Hash_Value").and_then(Element::non_empty_text) else {
            continue;
        };

        result.push(Indicator::new(kind, value.to_lowercase()));
    }

    let cross_refs: Vec<(IndicatorKind, String)> =
        result.iter().map(|i| (i.kind, i.value.clone())).collect();
    let basic = basic_properties(props);

    for indicator in &mut result {
        for (kind, value) in &cross_refs {
            if *kind == indicator.kind {
                continue;
            }
            indicator
                .attributes
                .insert(format!("stix_file_{}", kind), value.clone().into());
        }
        indicator.merge(&basic);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA256: &str = "ABCDEF0123456789ABCDEF0123456789ABCDEF0123456789ABCDEF0123456789";
    const SHA1: &str = "def0123456789abcdef0123456789abcdef01234";

    fn file_props() -> Element {
        Element::parse(&format!(
            r#"<FileObj:Properties xmlns:FileObj="f" xmlns:cyboxCommon="c">
                <FileObj:File_Name>dropper.exe</FileObj:File_Name>
                <FileObj:File_Size>1024</FileObj:File_Size>
                <FileObj:Hashes>
                    <cyboxCommon:Hash>
                        <cyboxCommon:Type>SHA256</cyboxCommon:Type>
                        <cyboxCommon:Simple_Hash_Value>{}</cyboxCommon:Simple_Hash_Value>
                    </cyboxCommon:Hash>
                    <cyboxCommon:Hash>
                        <cyboxCommon:Type>SHA1</cyboxCommon:Type>
                        <cyboxCommon:Simple_Hash_Value>{}</cyboxCommon:Simple_Hash_Value>
                    </cyboxCommon:Hash>
                    <cyboxCommon:Hash>
                        <cyboxCommon:Type>SHA512</cyboxCommon:Type>
                        <cyboxCommon:Simple_Hash_Value>ffff</cyboxCommon:Simple_Hash_Value>
                    </cyboxCommon:Hash>
                </FileObj:Hashes>
            </FileObj:Properties>"#,
            SHA256, SHA1
        ))
        .unwrap()
    }

    #[test]
    fn test_hashes_cross_annotated() {
        let result = decode(&file_props());
        assert_eq!(result.len(), 2);

        let sha256 = &result[0];
        assert_eq!(sha256.kind, IndicatorKind::Sha256);
        assert_eq!(sha256.value, SHA256.to_lowercase());
        assert_eq!(sha256.text_attribute("stix_file_sha1"), Some(SHA1));
        assert_eq!(sha256.text_attribute("stix_file_name"), Some("dropper.exe"));
        assert!(sha256.text_attribute("stix_file_sha256").is_none());

        let sha1 = &result[1];
        assert_eq!(sha1.kind, IndicatorKind::Sha1);
        assert_eq!(sha1.text_attribute("stix_file_sha256"), Some(SHA256.to_lowercase().as_str()));
        assert_eq!(sha1.text_attribute("stix_file_size"), Some("1024"));
    }

    #[test]
    fn test_no_hashes() {
        let props = Element::parse("<Properties><File_Name>a.txt</File_Name></Properties>").unwrap();
        assert!(decode(&props).is_empty());
    }
}
