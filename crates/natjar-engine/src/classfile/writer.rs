//! Class-file serialization

use super::constants::*;
use super::{Attribute, ClassFile, Code};

/// Big-endian class-file byte buffer
#[derive(Default)]
pub struct ClassWriter {
    buffer: Vec<u8>,
}

impl ClassWriter {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn emit_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }
}

impl ClassFile {
    /// Serialize to class-file bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ClassWriter::new();
        w.emit_u32(0xCAFE_BABE);
        w.emit_u16(self.minor_version);
        w.emit_u16(self.major_version);

        write_constant_pool(&mut w, &self.pool);

        w.emit_u16(self.access_flags);
        w.emit_u16(self.this_class);
        w.emit_u16(self.super_class);

        w.emit_u16(self.interfaces.len() as u16);
        for iface in &self.interfaces {
            w.emit_u16(*iface);
        }

        w.emit_u16(self.fields.len() as u16);
        for field in &self.fields {
            w.emit_u16(field.access_flags);
            w.emit_u16(field.name_index);
            w.emit_u16(field.descriptor_index);
            write_attributes(&mut w, &field.attributes);
        }

        w.emit_u16(self.methods.len() as u16);
        for method in &self.methods {
            w.emit_u16(method.access_flags);
            w.emit_u16(method.name_index);
            w.emit_u16(method.descriptor_index);
            write_attributes(&mut w, &method.attributes);
        }

        write_attributes(&mut w, &self.attributes);
        w.into_bytes()
    }
}

fn write_constant_pool(w: &mut ClassWriter, pool: &ConstantPool) {
    w.emit_u16(pool.count() as u16);
    for constant in pool.entries() {
        match constant {
            Constant::Unusable => {}
            Constant::Utf8(bytes) => {
                w.emit_u8(TAG_UTF8);
                w.emit_u16(bytes.len() as u16);
                w.emit_bytes(bytes);
            }
            Constant::Integer(v) => {
                w.emit_u8(TAG_INTEGER);
                w.emit_u32(*v as u32);
            }
            Constant::Float(bits) => {
                w.emit_u8(TAG_FLOAT);
                w.emit_u32(*bits);
            }
            Constant::Long(v) => {
                w.emit_u8(TAG_LONG);
                w.emit_u64(*v as u64);
            }
            Constant::Double(bits) => {
                w.emit_u8(TAG_DOUBLE);
                w.emit_u64(*bits);
            }
            Constant::Class(name) => {
                w.emit_u8(TAG_CLASS);
                w.emit_u16(*name);
            }
            Constant::String(utf8) => {
                w.emit_u8(TAG_STRING);
                w.emit_u16(*utf8);
            }
            Constant::Fieldref { class, name_and_type } => {
                w.emit_u8(TAG_FIELDREF);
                w.emit_u16(*class);
                w.emit_u16(*name_and_type);
            }
            Constant::Methodref { class, name_and_type } => {
                w.emit_u8(TAG_METHODREF);
                w.emit_u16(*class);
                w.emit_u16(*name_and_type);
            }
            Constant::InterfaceMethodref { class, name_and_type } => {
                w.emit_u8(TAG_INTERFACE_METHODREF);
                w.emit_u16(*class);
                w.emit_u16(*name_and_type);
            }
            Constant::NameAndType { name, descriptor } => {
                w.emit_u8(TAG_NAME_AND_TYPE);
                w.emit_u16(*name);
                w.emit_u16(*descriptor);
            }
            Constant::MethodHandle { kind, reference } => {
                w.emit_u8(TAG_METHOD_HANDLE);
                w.emit_u8(*kind);
                w.emit_u16(*reference);
            }
            Constant::MethodType(desc) => {
                w.emit_u8(TAG_METHOD_TYPE);
                w.emit_u16(*desc);
            }
            Constant::Dynamic { bootstrap, name_and_type } => {
                w.emit_u8(TAG_DYNAMIC);
                w.emit_u16(*bootstrap);
                w.emit_u16(*name_and_type);
            }
            Constant::InvokeDynamic { bootstrap, name_and_type } => {
                w.emit_u8(TAG_INVOKE_DYNAMIC);
                w.emit_u16(*bootstrap);
                w.emit_u16(*name_and_type);
            }
            Constant::Module(name) => {
                w.emit_u8(TAG_MODULE);
                w.emit_u16(*name);
            }
            Constant::Package(name) => {
                w.emit_u8(TAG_PACKAGE);
                w.emit_u16(*name);
            }
        }
    }
}

fn write_attributes(w: &mut ClassWriter, attributes: &[Attribute]) {
    w.emit_u16(attributes.len() as u16);
    for attribute in attributes {
        match attribute {
            Attribute::Raw { name_index, data } => {
                w.emit_u16(*name_index);
                w.emit_u32(data.len() as u32);
                w.emit_bytes(data);
            }
            Attribute::Code(code) => {
                w.emit_u16(code.name_index);
                let body = encode_code(code);
                w.emit_u32(body.len() as u32);
                w.emit_bytes(&body);
            }
        }
    }
}

fn encode_code(code: &Code) -> Vec<u8> {
    let mut w = ClassWriter::new();
    w.emit_u16(code.max_stack);
    w.emit_u16(code.max_locals);
    w.emit_u32(code.code.len() as u32);
    w.emit_bytes(&code.code);
    w.emit_u16(code.exception_table.len() as u16);
    for entry in &code.exception_table {
        w.emit_u16(entry.start_pc);
        w.emit_u16(entry.end_pc);
        w.emit_u16(entry.handler_pc);
        w.emit_u16(entry.catch_type);
    }
    write_attributes(&mut w, &code.attributes);
    w.into_bytes()
}
