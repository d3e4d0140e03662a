//! JVM instruction opcodes
//!
//! The complete opcode table of the class-file format (`0x00`-`0xc9`).
//! Reserved opcodes (`breakpoint`, `impdep1`, `impdep2`) never appear in class
//! files and are rejected by [`Opcode::from_u8`].

use std::fmt;

/// JVM opcode
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    // ===== Constants =====
    Nop = 0x00,
    AconstNull = 0x01,
    IconstM1 = 0x02,
    Iconst0 = 0x03,
    Iconst1 = 0x04,
    Iconst2 = 0x05,
    Iconst3 = 0x06,
    Iconst4 = 0x07,
    Iconst5 = 0x08,
    Lconst0 = 0x09,
    Lconst1 = 0x0a,
    Fconst0 = 0x0b,
    Fconst1 = 0x0c,
    Fconst2 = 0x0d,
    Dconst0 = 0x0e,
    Dconst1 = 0x0f,
    Bipush = 0x10,
    Sipush = 0x11,
    Ldc = 0x12,
    LdcW = 0x13,
    Ldc2W = 0x14,

    // ===== Loads =====
    Iload = 0x15,
    Lload = 0x16,
    Fload = 0x17,
    Dload = 0x18,
    Aload = 0x19,
    Iload0 = 0x1a,
    Iload1 = 0x1b,
    Iload2 = 0x1c,
    Iload3 = 0x1d,
    Lload0 = 0x1e,
    Lload1 = 0x1f,
    Lload2 = 0x20,
    Lload3 = 0x21,
    Fload0 = 0x22,
    Fload1 = 0x23,
    Fload2 = 0x24,
    Fload3 = 0x25,
    Dload0 = 0x26,
    Dload1 = 0x27,
    Dload2 = 0x28,
    Dload3 = 0x29,
    Aload0 = 0x2a,
    Aload1 = 0x2b,
    Aload2 = 0x2c,
    Aload3 = 0x2d,
    Iaload = 0x2e,
    Laload = 0x2f,
    Faload = 0x30,
    Daload = 0x31,
    Aaload = 0x32,
    Baload = 0x33,
    Caload = 0x34,
    Saload = 0x35,

    // ===== Stores =====
    Istore = 0x36,
    Lstore = 0x37,
    Fstore = 0x38,
    Dstore = 0x39,
    Astore = 0x3a,
    Istore0 = 0x3b,
    Istore1 = 0x3c,
    Istore2 = 0x3d,
    Istore3 = 0x3e,
    Lstore0 = 0x3f,
    Lstore1 = 0x40,
    Lstore2 = 0x41,
    Lstore3 = 0x42,
    Fstore0 = 0x43,
    Fstore1 = 0x44,
    Fstore2 = 0x45,
    Fstore3 = 0x46,
    Dstore0 = 0x47,
    Dstore1 = 0x48,
    Dstore2 = 0x49,
    Dstore3 = 0x4a,
    Astore0 = 0x4b,
    Astore1 = 0x4c,
    Astore2 = 0x4d,
    Astore3 = 0x4e,
    Iastore = 0x4f,
    Lastore = 0x50,
    Fastore = 0x51,
    Dastore = 0x52,
    Aastore = 0x53,
    Bastore = 0x54,
    Castore = 0x55,
    Sastore = 0x56,

    // ===== Stack =====
    Pop = 0x57,
    Pop2 = 0x58,
    Dup = 0x59,
    DupX1 = 0x5a,
    DupX2 = 0x5b,
    Dup2 = 0x5c,
    Dup2X1 = 0x5d,
    Dup2X2 = 0x5e,
    Swap = 0x5f,

    // ===== Math =====
    Iadd = 0x60,
    Ladd = 0x61,
    Fadd = 0x62,
    Dadd = 0x63,
    Isub = 0x64,
    Lsub = 0x65,
    Fsub = 0x66,
    Dsub = 0x67,
    Imul = 0x68,
    Lmul = 0x69,
    Fmul = 0x6a,
    Dmul = 0x6b,
    Idiv = 0x6c,
    Ldiv = 0x6d,
    Fdiv = 0x6e,
    Ddiv = 0x6f,
    Irem = 0x70,
    Lrem = 0x71,
    Frem = 0x72,
    Drem = 0x73,
    Ineg = 0x74,
    Lneg = 0x75,
    Fneg = 0x76,
    Dneg = 0x77,
    Ishl = 0x78,
    Lshl = 0x79,
    Ishr = 0x7a,
    Lshr = 0x7b,
    Iushr = 0x7c,
    Lushr = 0x7d,
    Iand = 0x7e,
    Land = 0x7f,
    Ior = 0x80,
    Lor = 0x81,
    Ixor = 0x82,
    Lxor = 0x83,
    Iinc = 0x84,

    // ===== Conversions =====
    I2l = 0x85,
    I2f = 0x86,
    I2d = 0x87,
    L2i = 0x88,
    L2f = 0x89,
    L2d = 0x8a,
    F2i = 0x8b,
    F2l = 0x8c,
    F2d = 0x8d,
    D2i = 0x8e,
    D2l = 0x8f,
    D2f = 0x90,
    I2b = 0x91,
    I2c = 0x92,
    I2s = 0x93,

    // ===== Comparisons =====
    Lcmp = 0x94,
    Fcmpl = 0x95,
    Fcmpg = 0x96,
    Dcmpl = 0x97,
    Dcmpg = 0x98,
    Ifeq = 0x99,
    Ifne = 0x9a,
    Iflt = 0x9b,
    Ifge = 0x9c,
    Ifgt = 0x9d,
    Ifle = 0x9e,
    IfIcmpeq = 0x9f,
    IfIcmpne = 0xa0,
    IfIcmplt = 0xa1,
    IfIcmpge = 0xa2,
    IfIcmpgt = 0xa3,
    IfIcmple = 0xa4,
    IfAcmpeq = 0xa5,
    IfAcmpne = 0xa6,

    // ===== Control =====
    Goto = 0xa7,
    Jsr = 0xa8,
    Ret = 0xa9,
    Tableswitch = 0xaa,
    Lookupswitch = 0xab,
    Ireturn = 0xac,
    Lreturn = 0xad,
    Freturn = 0xae,
    Dreturn = 0xaf,
    Areturn = 0xb0,
    Return = 0xb1,

    // ===== References =====
    Getstatic = 0xb2,
    Putstatic = 0xb3,
    Getfield = 0xb4,
    Putfield = 0xb5,
    Invokevirtual = 0xb6,
    Invokespecial = 0xb7,
    Invokestatic = 0xb8,
    Invokeinterface = 0xb9,
    Invokedynamic = 0xba,
    New = 0xbb,
    Newarray = 0xbc,
    Anewarray = 0xbd,
    Arraylength = 0xbe,
    Athrow = 0xbf,
    Checkcast = 0xc0,
    Instanceof = 0xc1,
    Monitorenter = 0xc2,
    Monitorexit = 0xc3,

    // ===== Extended =====
    Wide = 0xc4,
    Multianewarray = 0xc5,
    Ifnull = 0xc6,
    Ifnonnull = 0xc7,
    GotoW = 0xc8,
    JsrW = 0xc9,
}

impl Opcode {
    /// Decode an opcode byte
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Nop),
            0x01 => Some(Self::AconstNull),
            0x02 => Some(Self::IconstM1),
            0x03 => Some(Self::Iconst0),
            0x04 => Some(Self::Iconst1),
            0x05 => Some(Self::Iconst2),
            0x06 => Some(Self::Iconst3),
            0x07 => Some(Self::Iconst4),
            0x08 => Some(Self::Iconst5),
            0x09 => Some(Self::Lconst0),
            0x0a => Some(Self::Lconst1),
            0x0b => Some(Self::Fconst0),
            0x0c => Some(Self::Fconst1),
            0x0d => Some(Self::Fconst2),
            0x0e => Some(Self::Dconst0),
            0x0f => Some(Self::Dconst1),
            0x10 => Some(Self::Bipush),
            0x11 => Some(Self::Sipush),
            0x12 => Some(Self::Ldc),
            0x13 => Some(Self::LdcW),
            0x14 => Some(Self::Ldc2W),
            0x15 => Some(Self::Iload),
            0x16 => Some(Self::Lload),
            0x17 => Some(Self::Fload),
            0x18 => Some(Self::Dload),
            0x19 => Some(Self::Aload),
            0x1a => Some(Self::Iload0),
            0x1b => Some(Self::Iload1),
            0x1c => Some(Self::Iload2),
            0x1d => Some(Self::Iload3),
            0x1e => Some(Self::Lload0),
            0x1f => Some(Self::Lload1),
            0x20 => Some(Self::Lload2),
            0x21 => Some(Self::Lload3),
            0x22 => Some(Self::Fload0),
            0x23 => Some(Self::Fload1),
            0x24 => Some(Self::Fload2),
            0x25 => Some(Self::Fload3),
            0x26 => Some(Self::Dload0),
            0x27 => Some(Self::Dload1),
            0x28 => Some(Self::Dload2),
            0x29 => Some(Self::Dload3),
            0x2a => Some(Self::Aload0),
            0x2b => Some(Self::Aload1),
            0x2c => Some(Self::Aload2),
            0x2d => Some(Self::Aload3),
            0x2e => Some(Self::Iaload),
            0x2f => Some(Self::Laload),
            0x30 => Some(Self::Faload),
            0x31 => Some(Self::Daload),
            0x32 => Some(Self::Aaload),
            0x33 => Some(Self::Baload),
            0x34 => Some(Self::Caload),
            0x35 => Some(Self::Saload),
            0x36 => Some(Self::Istore),
            0x37 => Some(Self::Lstore),
            0x38 => Some(Self::Fstore),
            0x39 => Some(Self::Dstore),
            0x3a => Some(Self::Astore),
            0x3b => Some(Self::Istore0),
            0x3c => Some(Self::Istore1),
            0x3d => Some(Self::Istore2),
            0x3e => Some(Self::Istore3),
            0x3f => Some(Self::Lstore0),
            0x40 => Some(Self::Lstore1),
            0x41 => Some(Self::Lstore2),
            0x42 => Some(Self::Lstore3),
            0x43 => Some(Self::Fstore0),
            0x44 => Some(Self::Fstore1),
            0x45 => Some(Self::Fstore2),
            0x46 => Some(Self::Fstore3),
            0x47 => Some(Self::Dstore0),
            0x48 => Some(Self::Dstore1),
            0x49 => Some(Self::Dstore2),
            0x4a => Some(Self::Dstore3),
            0x4b => Some(Self::Astore0),
            0x4c => Some(Self::Astore1),
            0x4d => Some(Self::Astore2),
            0x4e => Some(Self::Astore3),
            0x4f => Some(Self::Iastore),
            0x50 => Some(Self::Lastore),
            0x51 => Some(Self::Fastore),
            0x52 => Some(Self::Dastore),
            0x53 => Some(Self::Aastore),
            0x54 => Some(Self::Bastore),
            0x55 => Some(Self::Castore),
            0x56 => Some(Self::Sastore),
            0x57 => Some(Self::Pop),
            0x58 => Some(Self::Pop2),
            0x59 => Some(Self::Dup),
            0x5a => Some(Self::DupX1),
            0x5b => Some(Self::DupX2),
            0x5c => Some(Self::Dup2),
            0x5d => Some(Self::Dup2X1),
            0x5e => Some(Self::Dup2X2),
            0x5f => Some(Self::Swap),
            0x60 => Some(Self::Iadd),
            0x61 => Some(Self::Ladd),
            0x62 => Some(Self::Fadd),
            0x63 => Some(Self::Dadd),
            0x64 => Some(Self::Isub),
            0x65 => Some(Self::Lsub),
            0x66 => Some(Self::Fsub),
            0x67 => Some(Self::Dsub),
            0x68 => Some(Self::Imul),
            0x69 => Some(Self::Lmul),
            0x6a => Some(Self::Fmul),
            0x6b => Some(Self::Dmul),
            0x6c => Some(Self::Idiv),
            0x6d => Some(Self::Ldiv),
            0x6e => Some(Self::Fdiv),
            0x6f => Some(Self::Ddiv),
            0x70 => Some(Self::Irem),
            0x71 => Some(Self::Lrem),
            0x72 => Some(Self::Frem),
            0x73 => Some(Self::Drem),
            0x74 => Some(Self::Ineg),
            0x75 => Some(Self::Lneg),
            0x76 => Some(Self::Fneg),
            0x77 => Some(Self::Dneg),
            0x78 => Some(Self::Ishl),
            0x79 => Some(Self::Lshl),
            0x7a => Some(Self::Ishr),
            0x7b => Some(Self::Lshr),
            0x7c => Some(Self::Iushr),
            0x7d => Some(Self::Lushr),
            0x7e => Some(Self::Iand),
            0x7f => Some(Self::Land),
            0x80 => Some(Self::Ior),
            0x81 => Some(Self::Lor),
            0x82 => Some(Self::Ixor),
            0x83 => Some(Self::Lxor),
            0x84 => Some(Self::Iinc),
            0x85 => Some(Self::I2l),
            0x86 => Some(Self::I2f),
            0x87 => Some(Self::I2d),
            0x88 => Some(Self::L2i),
            0x89 => Some(Self::L2f),
            0x8a => Some(Self::L2d),
            0x8b => Some(Self::F2i),
            0x8c => Some(Self::F2l),
            0x8d => Some(Self::F2d),
            0x8e => Some(Self::D2i),
            0x8f => Some(Self::D2l),
            0x90 => Some(Self::D2f),
            0x91 => Some(Self::I2b),
            0x92 => Some(Self::I2c),
            0x93 => Some(Self::I2s),
            0x94 => Some(Self::Lcmp),
            0x95 => Some(Self::Fcmpl),
            0x96 => Some(Self::Fcmpg),
            0x97 => Some(Self::Dcmpl),
            0x98 => Some(Self::Dcmpg),
            0x99 => Some(Self::Ifeq),
            0x9a => Some(Self::Ifne),
            0x9b => Some(Self::Iflt),
            0x9c => Some(Self::Ifge),
            0x9d => Some(Self::Ifgt),
            0x9e => Some(Self::Ifle),
            0x9f => Some(Self::IfIcmpeq),
            0xa0 => Some(Self::IfIcmpne),
            0xa1 => Some(Self::IfIcmplt),
            0xa2 => Some(Self::IfIcmpge),
            0xa3 => Some(Self::IfIcmpgt),
            0xa4 => Some(Self::IfIcmple),
            0xa5 => Some(Self::IfAcmpeq),
            0xa6 => Some(Self::IfAcmpne),
            0xa7 => Some(Self::Goto),
            0xa8 => Some(Self::Jsr),
            0xa9 => Some(Self::Ret),
            0xaa => Some(Self::Tableswitch),
            0xab => Some(Self::Lookupswitch),
            0xac => Some(Self::Ireturn),
            0xad => Some(Self::Lreturn),
            0xae => Some(Self::Freturn),
            0xaf => Some(Self::Dreturn),
            0xb0 => Some(Self::Areturn),
            0xb1 => Some(Self::Return),
            0xb2 => Some(Self::Getstatic),
            0xb3 => Some(Self::Putstatic),
            0xb4 => Some(Self::Getfield),
            0xb5 => Some(Self::Putfield),
            0xb6 => Some(Self::Invokevirtual),
            0xb7 => Some(Self::Invokespecial),
            0xb8 => Some(Self::Invokestatic),
            0xb9 => Some(Self::Invokeinterface),
            0xba => Some(Self::Invokedynamic),
            0xbb => Some(Self::New),
            0xbc => Some(Self::Newarray),
            0xbd => Some(Self::Anewarray),
            0xbe => Some(Self::Arraylength),
            0xbf => Some(Self::Athrow),
            0xc0 => Some(Self::Checkcast),
            0xc1 => Some(Self::Instanceof),
            0xc2 => Some(Self::Monitorenter),
            0xc3 => Some(Self::Monitorexit),
            0xc4 => Some(Self::Wide),
            0xc5 => Some(Self::Multianewarray),
            0xc6 => Some(Self::Ifnull),
            0xc7 => Some(Self::Ifnonnull),
            0xc8 => Some(Self::GotoW),
            0xc9 => Some(Self::JsrW),
            _ => None,
        }
    }

    /// Mnemonic as printed by `javap`
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::AconstNull => "aconst_null",
            Self::IconstM1 => "iconst_m1",
            Self::Iconst0 => "iconst_0",
            Self::Iconst1 => "iconst_1",
            Self::Iconst2 => "iconst_2",
            Self::Iconst3 => "iconst_3",
            Self::Iconst4 => "iconst_4",
            Self::Iconst5 => "iconst_5",
            Self::Lconst0 => "lconst_0",
            Self::Lconst1 => "lconst_1",
            Self::Fconst0 => "fconst_0",
            Self::Fconst1 => "fconst_1",
            Self::Fconst2 => "fconst_2",
            Self::Dconst0 => "dconst_0",
            Self::Dconst1 => "dconst_1",
            Self::Bipush => "bipush",
            Self::Sipush => "sipush",
            Self::Ldc => "ldc",
            Self::LdcW => "ldc_w",
            Self::Ldc2W => "ldc2_w",
            Self::Iload => "iload",
            Self::Lload => "lload",
            Self::Fload => "fload",
            Self::Dload => "dload",
            Self::Aload => "aload",
            Self::Iload0 => "iload_0",
            Self::Iload1 => "iload_1",
            Self::Iload2 => "iload_2",
            Self::Iload3 => "iload_3",
            Self::Lload0 => "lload_0",
            Self::Lload1 => "lload_1",
            Self::Lload2 => "lload_2",
            Self::Lload3 => "lload_3",
            Self::Fload0 => "fload_0",
            Self::Fload1 => "fload_1",
            Self::Fload2 => "fload_2",
            Self::Fload3 => "fload_3",
            Self::Dload0 => "dload_0",
            Self::Dload1 => "dload_1",
            Self::Dload2 => "dload_2",
            Self::Dload3 => "dload_3",
            Self::Aload0 => "aload_0",
            Self::Aload1 => "aload_1",
            Self::Aload2 => "aload_2",
            Self::Aload3 => "aload_3",
            Self::Iaload => "iaload",
            Self::Laload => "laload",
            Self::Faload => "faload",
            Self::Daload => "daload",
            Self::Aaload => "aaload",
            Self::Baload => "baload",
            Self::Caload => "caload",
            Self::Saload => "saload",
            Self::Istore => "istore",
            Self::Lstore => "lstore",
            Self::Fstore => "fstore",
            Self::Dstore => "dstore",
            Self::Astore => "astore",
            Self::Istore0 => "istore_0",
            Self::Istore1 => "istore_1",
            Self::Istore2 => "istore_2",
            Self::Istore3 => "istore_3",
            Self::Lstore0 => "lstore_0",
            Self::Lstore1 => "lstore_1",
            Self::Lstore2 => "lstore_2",
            Self::Lstore3 => "lstore_3",
            Self::Fstore0 => "fstore_0",
            Self::Fstore1 => "fstore_1",
            Self::Fstore2 => "fstore_2",
            Self::Fstore3 => "fstore_3",
            Self::Dstore0 => "dstore_0",
            Self::Dstore1 => "dstore_1",
            Self::Dstore2 => "dstore_2",
            Self::Dstore3 => "dstore_3",
            Self::Astore0 => "astore_0",
            Self::Astore1 => "astore_1",
            Self::Astore2 => "astore_2",
            Self::Astore3 => "astore_3",
            Self::Iastore => "iastore",
            Self::Lastore => "lastore",
            Self::Fastore => "fastore",
            Self::Dastore => "dastore",
            Self::Aastore => "aastore",
            Self::Bastore => "bastore",
            Self::Castore => "castore",
            Self::Sastore => "sastore",
            Self::Pop => "pop",
            Self::Pop2 => "pop2",
            Self::Dup => "dup",
            Self::DupX1 => "dup_x1",
            Self::DupX2 => "dup_x2",
            Self::Dup2 => "dup2",
            Self::Dup2X1 => "dup2_x1",
            Self::Dup2X2 => "dup2_x2",
            Self::Swap => "swap",
            Self::Iadd => "iadd",
            Self::Ladd => "ladd",
            Self::Fadd => "fadd",
            Self::Dadd => "dadd",
            Self::Isub => "isub",
            Self::Lsub => "lsub",
            Self::Fsub => "fsub",
            Self::Dsub => "dsub",
            Self::Imul => "imul",
            Self::Lmul => "lmul",
            Self::Fmul => "fmul",
            Self::Dmul => "dmul",
            Self::Idiv => "idiv",
            Self::Ldiv => "ldiv",
            Self::Fdiv => "fdiv",
            Self::Ddiv => "ddiv",
            Self::Irem => "irem",
            Self::Lrem => "lrem",
            Self::Frem => "frem",
            Self::Drem => "drem",
            Self::Ineg => "ineg",
            Self::Lneg => "lneg",
            Self::Fneg => "fneg",
            Self::Dneg => "dneg",
            Self::Ishl => "ishl",
            Self::Lshl => "lshl",
            Self::Ishr => "ishr",
            Self::Lshr => "lshr",
            Self::Iushr => "iushr",
            Self::Lushr => "lushr",
            Self::Iand => "iand",
            Self::Land => "land",
            Self::Ior => "ior",
            Self::Lor => "lor",
            Self::Ixor => "ixor",
            Self::Lxor => "lxor",
            Self::Iinc => "iinc",
            Self::I2l => "i2l",
            Self::I2f => "i2f",
            Self::I2d => "i2d",
            Self::L2i => "l2i",
            Self::L2f => "l2f",
            Self::L2d => "l2d",
            Self::F2i => "f2i",
            Self::F2l => "f2l",
            Self::F2d => "f2d",
            Self::D2i => "d2i",
            Self::D2l => "d2l",
            Self::D2f => "d2f",
            Self::I2b => "i2b",
            Self::I2c => "i2c",
            Self::I2s => "i2s",
            Self::Lcmp => "lcmp",
            Self::Fcmpl => "fcmpl",
            Self::Fcmpg => "fcmpg",
            Self::Dcmpl => "dcmpl",
            Self::Dcmpg => "dcmpg",
            Self::Ifeq => "ifeq",
            Self::Ifne => "ifne",
            Self::Iflt => "iflt",
            Self::Ifge => "ifge",
            Self::Ifgt => "ifgt",
            Self::Ifle => "ifle",
            Self::IfIcmpeq => "if_icmpeq",
            Self::IfIcmpne => "if_icmpne",
            Self::IfIcmplt => "if_icmplt",
            Self::IfIcmpge => "if_icmpge",
            Self::IfIcmpgt => "if_icmpgt",
            Self::IfIcmple => "if_icmple",
            Self::IfAcmpeq => "if_acmpeq",
            Self::IfAcmpne => "if_acmpne",
            Self::Goto => "goto",
            Self::Jsr => "jsr",
            Self::Ret => "ret",
            Self::Tableswitch => "tableswitch",
            Self::Lookupswitch => "lookupswitch",
            Self::Ireturn => "ireturn",
            Self::Lreturn => "lreturn",
            Self::Freturn => "freturn",
            Self::Dreturn => "dreturn",
            Self::Areturn => "areturn",
            Self::Return => "return",
            Self::Getstatic => "getstatic",
            Self::Putstatic => "putstatic",
            Self::Getfield => "getfield",
            Self::Putfield => "putfield",
            Self::Invokevirtual => "invokevirtual",
            Self::Invokespecial => "invokespecial",
            Self::Invokestatic => "invokestatic",
            Self::Invokeinterface => "invokeinterface",
            Self::Invokedynamic => "invokedynamic",
            Self::New => "new",
            Self::Newarray => "newarray",
            Self::Anewarray => "anewarray",
            Self::Arraylength => "arraylength",
            Self::Athrow => "athrow",
            Self::Checkcast => "checkcast",
            Self::Instanceof => "instanceof",
            Self::Monitorenter => "monitorenter",
            Self::Monitorexit => "monitorexit",
            Self::Wide => "wide",
            Self::Multianewarray => "multianewarray",
            Self::Ifnull => "ifnull",
            Self::Ifnonnull => "ifnonnull",
            Self::GotoW => "goto_w",
            Self::JsrW => "jsr_w",
        }
    }

    /// Whether control never falls through to the next instruction
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Self::Goto
                | Self::GotoW
                | Self::Tableswitch
                | Self::Lookupswitch
                | Self::Ireturn
                | Self::Lreturn
                | Self::Freturn
                | Self::Dreturn
                | Self::Areturn
                | Self::Return
                | Self::Athrow
                | Self::Ret
        )
    }

    /// Conditional branches with a single 16-bit target
    pub fn is_conditional_branch(self) -> bool {
        matches!(self as u8, 0x99..=0xa6 | 0xc6 | 0xc7)
    }

    pub fn is_return(self) -> bool {
        matches!(self as u8, 0xac..=0xb1)
    }

    pub fn is_invoke(self) -> bool {
        matches!(self as u8, 0xb6..=0xba)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
