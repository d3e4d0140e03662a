//! `RuntimeVisibleAnnotations` / `RuntimeInvisibleAnnotations`
//!
//! Only annotation types are extracted; element values are skipped.

use super::reader::ClassReader;
use super::{Attribute, ClassFormatError, ConstantPool};

const VISIBLE: &str = "RuntimeVisibleAnnotations";
const INVISIBLE: &str = "RuntimeInvisibleAnnotations";

/// Type descriptors (`Lpkg/Name;`) of every annotation in `attributes`.
///
/// A malformed annotation attribute is ignored, as the JVM does.
pub fn annotation_types(pool: &ConstantPool, attributes: &[Attribute]) -> Vec<String> {
    let mut types = Vec::new();
    for attr in attributes {
        let Attribute::Raw { name_index, data } = attr else {
            continue;
        };
        match pool.utf8(*name_index) {
            Ok(name) if name == VISIBLE || name == INVISIBLE => {}
            _ => continue,
        }
        match read_annotation_types(pool, data) {
            Ok(found) => types.extend(found),
            Err(err) => tracing::debug!(error = %err, "ignoring malformed annotation attribute"),
        }
    }
    types
}

fn read_annotation_types(pool: &ConstantPool, data: &[u8]) -> Result<Vec<String>, ClassFormatError> {
    let mut reader = ClassReader::new(data);
    let count = reader.read_u16()?;
    let mut types = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let type_index = read_annotation(&mut reader)?;
        types.push(pool.utf8(type_index)?);
    }
    Ok(types)
}

/// Read one annotation and return its type index
fn read_annotation(reader: &mut ClassReader<'_>) -> Result<u16, ClassFormatError> {
    let type_index = reader.read_u16()?;
    let pairs = reader.read_u16()?;
    for _ in 0..pairs {
        reader.read_u16()?;
        skip_element_value(reader)?;
    }
    Ok(type_index)
}

fn skip_element_value(reader: &mut ClassReader<'_>) -> Result<(), ClassFormatError> {
    match reader.read_u8()? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => {
            reader.read_u16()?;
        }
        b'e' => {
            reader.read_u16()?;
            reader.read_u16()?;
        }
        b'@' => {
            read_annotation(reader)?;
        }
        b'[' => {
            let values = reader.read_u16()?;
            for _ in 0..values {
                skip_element_value(reader)?;
            }
        }
        tag => {
            return Err(ClassFormatError::Malformed(format!(
                "unknown element value tag {:?}",
                tag as char
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attribute(pool: &mut ConstantPool, name: &str, data: Vec<u8>) -> Attribute {
        Attribute::Raw {
            name_index: pool.intern_utf8(name).unwrap(),
            data,
        }
    }

    #[test]
    fn test_types_are_read_past_element_values() {
        let mut pool = ConstantPool::new();
        let outer = pool.intern_utf8("La/Tagged;").unwrap();
        let marker = pool.intern_utf8("Lnatjar/annotations/Compile;").unwrap();
        let [o1, o0] = outer.to_be_bytes();
        let [m1, m0] = marker.to_be_bytes();
        // @Tagged(v = 1, xs = {1, 2}, kind = E.A, inner = @Compile) @Compile
        let data = vec![
            0, 2, //
            o1, o0, 0, 4, //
            0, 1, b'I', 0, 1, //
            0, 1, b'[', 0, 2, b'I', 0, 1, b'I', 0, 1, //
            0, 1, b'e', 0, 1, 0, 1, //
            0, 1, b'@', m1, m0, 0, 0, //
            m1, m0, 0, 0,
        ];
        let attrs = vec![attribute(&mut pool, "RuntimeInvisibleAnnotations", data)];
        assert_eq!(
            annotation_types(&pool, &attrs),
            vec!["La/Tagged;".to_string(), "Lnatjar/annotations/Compile;".to_string()]
        );
    }

    #[test]
    fn test_other_and_malformed_attributes_are_ignored() {
        let mut pool = ConstantPool::new();
        let marker = pool.intern_utf8("La/B;").unwrap();
        let [m1, m0] = marker.to_be_bytes();
        let attrs = vec![
            attribute(&mut pool, "Signature", vec![0, 1]),
            attribute(&mut pool, "RuntimeVisibleAnnotations", vec![0, 1, m1, m0, 0, 1, 0, 1, b'?']),
            attribute(&mut pool, "RuntimeVisibleAnnotations", vec![0, 1, m1, m0, 0, 0]),
        ];
        assert_eq!(annotation_types(&pool, &attrs), vec!["La/B;".to_string()]);
    }
}
