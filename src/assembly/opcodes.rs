//! JVM opcode byte constants and the static opcode table.
//!
//! Every opcode of the Java SE 8 instruction set is named after its mnemonic
//! (e.g. [`INVOKEVIRTUAL`] = `0xB6`). [`info`] maps an opcode byte to its mnemonic and the shape
//! of its operand bytes, which is all the decoder needs to walk a method body.
#![allow(missing_docs)]

// Constants
pub const NOP: u8 = 0x00;
pub const ACONST_NULL: u8 = 0x01;
pub const ICONST_M1: u8 = 0x02;
pub const ICONST_0: u8 = 0x03;
pub const ICONST_1: u8 = 0x04;
pub const ICONST_2: u8 = 0x05;
pub const ICONST_3: u8 = 0x06;
pub const ICONST_4: u8 = 0x07;
pub const ICONST_5: u8 = 0x08;
pub const LCONST_0: u8 = 0x09;
pub const LCONST_1: u8 = 0x0A;
pub const FCONST_0: u8 = 0x0B;
pub const FCONST_1: u8 = 0x0C;
pub const FCONST_2: u8 = 0x0D;
pub const DCONST_0: u8 = 0x0E;
pub const DCONST_1: u8 = 0x0F;
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;

// Loads
pub const ILOAD: u8 = 0x15;
pub const LLOAD: u8 = 0x16;
pub const FLOAD: u8 = 0x17;
pub const DLOAD: u8 = 0x18;
pub const ALOAD: u8 = 0x19;
pub const ILOAD_0: u8 = 0x1A;
pub const ILOAD_1: u8 = 0x1B;
pub const ILOAD_2: u8 = 0x1C;
pub const ILOAD_3: u8 = 0x1D;
pub const LLOAD_0: u8 = 0x1E;
pub const LLOAD_1: u8 = 0x1F;
pub const LLOAD_2: u8 = 0x20;
pub const LLOAD_3: u8 = 0x21;
pub const FLOAD_0: u8 = 0x22;
pub const FLOAD_1: u8 = 0x23;
pub const FLOAD_2: u8 = 0x24;
pub const FLOAD_3: u8 = 0x25;
pub const DLOAD_0: u8 = 0x26;
pub const DLOAD_1: u8 = 0x27;
pub const DLOAD_2: u8 = 0x28;
pub const DLOAD_3: u8 = 0x29;
pub const ALOAD_0: u8 = 0x2A;
pub const ALOAD_1: u8 = 0x2B;
pub const ALOAD_2: u8 = 0x2C;
pub const ALOAD_3: u8 = 0x2D;
pub const IALOAD: u8 = 0x2E;
pub const LALOAD: u8 = 0x2F;
pub const FALOAD: u8 = 0x30;
pub const DALOAD: u8 = 0x31;
pub const AALOAD: u8 = 0x32;
pub const BALOAD: u8 = 0x33;
pub const CALOAD: u8 = 0x34;
pub const SALOAD: u8 = 0x35;

// Stores
pub const ISTORE: u8 = 0x36;
pub const LSTORE: u8 = 0x37;
pub const FSTORE: u8 = 0x38;
pub const DSTORE: u8 = 0x39;
pub const ASTORE: u8 = 0x3A;
pub const ISTORE_0: u8 = 0x3B;
pub const ISTORE_1: u8 = 0x3C;
pub const ISTORE_2: u8 = 0x3D;
pub const ISTORE_3: u8 = 0x3E;
pub const LSTORE_0: u8 = 0x3F;
pub const LSTORE_1: u8 = 0x40;
pub const LSTORE_2: u8 = 0x41;
pub const LSTORE_3: u8 = 0x42;
pub const FSTORE_0: u8 = 0x43;
pub const FSTORE_1: u8 = 0x44;
pub const FSTORE_2: u8 = 0x45;
pub const FSTORE_3: u8 = 0x46;
pub const DSTORE_0: u8 = 0x47;
pub const DSTORE_1: u8 = 0x48;
pub const DSTORE_2: u8 = 0x49;
pub const DSTORE_3: u8 = 0x4A;
pub const ASTORE_0: u8 = 0x4B;
pub const ASTORE_1: u8 = 0x4C;
pub const ASTORE_2: u8 = 0x4D;
pub const ASTORE_3: u8 = 0x4E;
pub const IASTORE: u8 = 0x4F;
pub const LASTORE: u8 = 0x50;
pub const FASTORE: u8 = 0x51;
pub const DASTORE: u8 = 0x52;
pub const AASTORE: u8 = 0x53;
pub const BASTORE: u8 = 0x54;
pub const CASTORE: u8 = 0x55;
pub const SASTORE: u8 = 0x56;

// Stack
pub const POP: u8 = 0x57;
pub const POP2: u8 = 0x58;
pub const DUP: u8 = 0x59;
pub const DUP_X1: u8 = 0x5A;
pub const DUP_X2: u8 = 0x5B;
pub const DUP2: u8 = 0x5C;
pub const DUP2_X1: u8 = 0x5D;
pub const DUP2_X2: u8 = 0x5E;
pub const SWAP: u8 = 0x5F;

// Math
pub const IADD: u8 = 0x60;
pub const LADD: u8 = 0x61;
pub const FADD: u8 = 0x62;
pub const DADD: u8 = 0x63;
pub const ISUB: u8 = 0x64;
pub const LSUB: u8 = 0x65;
pub const FSUB: u8 = 0x66;
pub const DSUB: u8 = 0x67;
pub const IMUL: u8 = 0x68;
pub const LMUL: u8 = 0x69;
pub const FMUL: u8 = 0x6A;
pub const DMUL: u8 = 0x6B;
pub const IDIV: u8 = 0x6C;
pub const LDIV: u8 = 0x6D;
pub const FDIV: u8 = 0x6E;
pub const DDIV: u8 = 0x6F;
pub const IREM: u8 = 0x70;
pub const LREM: u8 = 0x71;
pub const FREM: u8 = 0x72;
pub const DREM: u8 = 0x73;
pub const INEG: u8 = 0x74;
pub const LNEG: u8 = 0x75;
pub const FNEG: u8 = 0x76;
pub const DNEG: u8 = 0x77;
pub const ISHL: u8 = 0x78;
pub const LSHL: u8 = 0x79;
pub const ISHR: u8 = 0x7A;
pub const LSHR: u8 = 0x7B;
pub const IUSHR: u8 = 0x7C;
pub const LUSHR: u8 = 0x7D;
pub const IAND: u8 = 0x7E;
pub const LAND: u8 = 0x7F;
pub const IOR: u8 = 0x80;
pub const LOR: u8 = 0x81;
pub const IXOR: u8 = 0x82;
pub const LXOR: u8 = 0x83;
pub const IINC: u8 = 0x84;

// Conversions
pub const I2L: u8 = 0x85;
pub const I2F: u8 = 0x86;
pub const I2D: u8 = 0x87;
pub const L2I: u8 = 0x88;
pub const L2F: u8 = 0x89;
pub const L2D: u8 = 0x8A;
pub const F2I: u8 = 0x8B;
pub const F2L: u8 = 0x8C;
pub const F2D: u8 = 0x8D;
pub const D2I: u8 = 0x8E;
pub const D2L: u8 = 0x8F;
pub const D2F: u8 = 0x90;
pub const I2B: u8 = 0x91;
pub const I2C: u8 = 0x92;
pub const I2S: u8 = 0x93;

// Comparisons
pub const LCMP: u8 = 0x94;
pub const FCMPL: u8 = 0x95;
pub const FCMPG: u8 = 0x96;
pub const DCMPL: u8 = 0x97;
pub const DCMPG: u8 = 0x98;
pub const IFEQ: u8 = 0x99;
pub const IFNE: u8 = 0x9A;
pub const IFLT: u8 = 0x9B;
pub const IFGE: u8 = 0x9C;
pub const IFGT: u8 = 0x9D;
pub const IFLE: u8 = 0x9E;
pub const IF_ICMPEQ: u8 = 0x9F;
pub const IF_ICMPNE: u8 = 0xA0;
pub const IF_ICMPLT: u8 = 0xA1;
pub const IF_ICMPGE: u8 = 0xA2;
pub const IF_ICMPGT: u8 = 0xA3;
pub const IF_ICMPLE: u8 = 0xA4;
pub const IF_ACMPEQ: u8 = 0xA5;
pub const IF_ACMPNE: u8 = 0xA6;

// Control
pub const GOTO: u8 = 0xA7;
pub const JSR: u8 = 0xA8;
pub const RET: u8 = 0xA9;
pub const TABLESWITCH: u8 = 0xAA;
pub const LOOKUPSWITCH: u8 = 0xAB;
pub const IRETURN: u8 = 0xAC;
pub const LRETURN: u8 = 0xAD;
pub const FRETURN: u8 = 0xAE;
pub const DRETURN: u8 = 0xAF;
pub const ARETURN: u8 = 0xB0;
pub const RETURN: u8 = 0xB1;

// References
pub const GETSTATIC: u8 = 0xB2;
pub const PUTSTATIC: u8 = 0xB3;
pub const GETFIELD: u8 = 0xB4;
pub const PUTFIELD: u8 = 0xB5;
pub const INVOKEVIRTUAL: u8 = 0xB6;
pub const INVOKESPECIAL: u8 = 0xB7;
pub const INVOKESTATIC: u8 = 0xB8;
pub const INVOKEINTERFACE: u8 = 0xB9;
pub const INVOKEDYNAMIC: u8 = 0xBA;
pub const NEW: u8 = 0xBB;
pub const NEWARRAY: u8 = 0xBC;
pub const ANEWARRAY: u8 = 0xBD;
pub const ARRAYLENGTH: u8 = 0xBE;
pub const ATHROW: u8 = 0xBF;
pub const CHECKCAST: u8 = 0xC0;
pub const INSTANCEOF: u8 = 0xC1;
pub const MONITORENTER: u8 = 0xC2;
pub const MONITOREXIT: u8 = 0xC3;

// Extended
pub const WIDE: u8 = 0xC4;
pub const MULTIANEWARRAY: u8 = 0xC5;
pub const IFNULL: u8 = 0xC6;
pub const IFNONNULL: u8 = 0xC7;
pub const GOTO_W: u8 = 0xC8;
pub const JSR_W: u8 = 0xC9;

/// The shape of the operand bytes following an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand bytes
    None,
    /// Signed 8-bit immediate (`bipush`)
    Byte,
    /// Signed 16-bit immediate (`sipush`)
    Short,
    /// Unsigned 8-bit constant pool index (`ldc`)
    PoolByte,
    /// Unsigned 16-bit constant pool index
    Pool,
    /// Local variable index, 8 bits or 16 bits under `wide`
    Local,
    /// Local index plus signed increment (`iinc`)
    Iinc,
    /// Signed 16-bit relative branch offset
    Branch,
    /// Signed 32-bit relative branch offset
    WideBranch,
    /// Padded jump table
    TableSwitch,
    /// Padded match/offset pairs
    LookupSwitch,
    /// Pool index, argument count and a zero byte (`invokeinterface`)
    Interface,
    /// Pool index and two zero bytes (`invokedynamic`)
    Dynamic,
    /// Primitive array type code (`newarray`)
    ArrayType,
    /// Pool index and dimension count (`multianewarray`)
    MultiArray,
    /// Prefix widening the local index of the next instruction
    Wide,
}

/// Static description of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    /// Mnemonic as used by `javap`
    pub mnemonic: &'static str,
    /// Operand layout
    pub operand: OperandKind,
}

impl OpcodeInfo {
    const fn new(mnemonic: &'static str, operand: OperandKind) -> Self {
        OpcodeInfo { mnemonic, operand }
    }
}

static OPCODES: [OpcodeInfo; 202] = [
    OpcodeInfo::new("nop", OperandKind::None),
    OpcodeInfo::new("aconst_null", OperandKind::None),
    OpcodeInfo::new("iconst_m1", OperandKind::None),
    OpcodeInfo::new("iconst_0", OperandKind::None),
    OpcodeInfo::new("iconst_1", OperandKind::None),
    OpcodeInfo::new("iconst_2", OperandKind::None),
    OpcodeInfo::new("iconst_3", OperandKind::None),
    OpcodeInfo::new("iconst_4", OperandKind::None),
    OpcodeInfo::new("iconst_5", OperandKind::None),
    OpcodeInfo::new("lconst_0", OperandKind::None),
    OpcodeInfo::new("lconst_1", OperandKind::None),
    OpcodeInfo::new("fconst_0", OperandKind::None),
    OpcodeInfo::new("fconst_1", OperandKind::None),
    OpcodeInfo::new("fconst_2", OperandKind::None),
    OpcodeInfo::new("dconst_0", OperandKind::None),
    OpcodeInfo::new("dconst_1", OperandKind::None),
    OpcodeInfo::new("bipush", OperandKind::Byte),
    OpcodeInfo::new("sipush", OperandKind::Short),
    OpcodeInfo::new("ldc", OperandKind::PoolByte),
    OpcodeInfo::new("ldc_w", OperandKind::Pool),
    OpcodeInfo::new("ldc2_w", OperandKind::Pool),
    OpcodeInfo::new("iload", OperandKind::Local),
    OpcodeInfo::new("lload", OperandKind::Local),
    OpcodeInfo::new("fload", OperandKind::Local),
    OpcodeInfo::new("dload", OperandKind::Local),
    OpcodeInfo::new("aload", OperandKind::Local),
    OpcodeInfo::new("iload_0", OperandKind::None),
    OpcodeInfo::new("iload_1", OperandKind::None),
    OpcodeInfo::new("iload_2", OperandKind::None),
    OpcodeInfo::new("iload_3", OperandKind::None),
    OpcodeInfo::new("lload_0", OperandKind::None),
    OpcodeInfo::new("lload_1", OperandKind::None),
    OpcodeInfo::new("lload_2", OperandKind::None),
    OpcodeInfo::new("lload_3", OperandKind::None),
    OpcodeInfo::new("fload_0", OperandKind::None),
    OpcodeInfo::new("fload_1", OperandKind::None),
    OpcodeInfo::new("fload_2", OperandKind::None),
    OpcodeInfo::new("fload_3", OperandKind::None),
    OpcodeInfo::new("dload_0", OperandKind::None),
    OpcodeInfo::new("dload_1", OperandKind::None),
    OpcodeInfo::new("dload_2", OperandKind::None),
    OpcodeInfo::new("dload_3", OperandKind::None),
    OpcodeInfo::new("aload_0", OperandKind::None),
    OpcodeInfo::new("aload_1", OperandKind::None),
    OpcodeInfo::new("aload_2", OperandKind::None),
    OpcodeInfo::new("aload_3", OperandKind::None),
    OpcodeInfo::new("iaload", OperandKind::None),
    OpcodeInfo::new("laload", OperandKind::None),
    OpcodeInfo::new("faload", OperandKind::None),
    OpcodeInfo::new("daload", OperandKind::None),
    OpcodeInfo::new("aaload", OperandKind::None),
    OpcodeInfo::new("baload", OperandKind::None),
    OpcodeInfo::new("caload", OperandKind::None),
    OpcodeInfo::new("saload", OperandKind::None),
    OpcodeInfo::new("istore", OperandKind::Local),
    OpcodeInfo::new("lstore", OperandKind::Local),
    OpcodeInfo::new("fstore", OperandKind::Local),
    OpcodeInfo::new("dstore", OperandKind::Local),
    OpcodeInfo::new("astore", OperandKind::Local),
    OpcodeInfo::new("istore_0", OperandKind::None),
    OpcodeInfo::new("istore_1", OperandKind::None),
    OpcodeInfo::new("istore_2", OperandKind::None),
    OpcodeInfo::new("istore_3", OperandKind::None),
    OpcodeInfo::new("lstore_0", OperandKind::None),
    OpcodeInfo::new("lstore_1", OperandKind::None),
    OpcodeInfo::new("lstore_2", OperandKind::None),
    OpcodeInfo::new("lstore_3", OperandKind::None),
    OpcodeInfo::new("fstore_0", OperandKind::None),
    OpcodeInfo::new("fstore_1", OperandKind::None),
    OpcodeInfo::new("fstore_2", OperandKind::None),
    OpcodeInfo::new("fstore_3", OperandKind::None),
    OpcodeInfo::new("dstore_0", OperandKind::None),
    OpcodeInfo::new("dstore_1", OperandKind::None),
    OpcodeInfo::new("dstore_2", OperandKind::None),
    OpcodeInfo::new("dstore_3", OperandKind::None),
    OpcodeInfo::new("astore_0", OperandKind::None),
    OpcodeInfo::new("astore_1", OperandKind::None),
    OpcodeInfo::new("astore_2", OperandKind::None),
    OpcodeInfo::new("astore_3", OperandKind::None),
    OpcodeInfo::new("iastore", OperandKind::None),
    OpcodeInfo::new("lastore", OperandKind::None),
    OpcodeInfo::new("fastore", OperandKind::None),
    OpcodeInfo::new("dastore", OperandKind::None),
    OpcodeInfo::new("aastore", OperandKind::None),
    OpcodeInfo::new("bastore", OperandKind::None),
    OpcodeInfo::new("castore", OperandKind::None),
    OpcodeInfo::new("sastore", OperandKind::None),
    OpcodeInfo::new("pop", OperandKind::None),
    OpcodeInfo::new("pop2", OperandKind::None),
    OpcodeInfo::new("dup", OperandKind::None),
    OpcodeInfo::new("dup_x1", OperandKind::None),
    OpcodeInfo::new("dup_x2", OperandKind::None),
    OpcodeInfo::new("dup2", OperandKind::None),
    OpcodeInfo::new("dup2_x1", OperandKind::None),
    OpcodeInfo::new("dup2_x2", OperandKind::None),
    OpcodeInfo::new("swap", OperandKind::None),
    OpcodeInfo::new("iadd", OperandKind::None),
    OpcodeInfo::new("ladd", OperandKind::None),
    OpcodeInfo::new("fadd", OperandKind::None),
    OpcodeInfo::new("dadd", OperandKind::None),
    OpcodeInfo::new("isub", OperandKind::None),
    OpcodeInfo::new("lsub", OperandKind::None),
    OpcodeInfo::new("fsub", OperandKind::None),
    OpcodeInfo::new("dsub", OperandKind::None),
    OpcodeInfo::new("imul", OperandKind::None),
    OpcodeInfo::new("lmul", OperandKind::None),
    OpcodeInfo::new("fmul", OperandKind::None),
    OpcodeInfo::new("dmul", OperandKind::None),
    OpcodeInfo::new("idiv", OperandKind::None),
    OpcodeInfo::new("ldiv", OperandKind::None),
    OpcodeInfo::new("fdiv", OperandKind::None),
    OpcodeInfo::new("ddiv", OperandKind::None),
    OpcodeInfo::new("irem", OperandKind::None),
    OpcodeInfo::new("lrem", OperandKind::None),
    OpcodeInfo::new("frem", OperandKind::None),
    OpcodeInfo::new("drem", OperandKind::None),
    OpcodeInfo::new("ineg", OperandKind::None),
    OpcodeInfo::new("lneg", OperandKind::None),
    OpcodeInfo::new("fneg", OperandKind::None),
    OpcodeInfo::new("dneg", OperandKind::None),
    OpcodeInfo::new("ishl", OperandKind::None),
    OpcodeInfo::new("lshl", OperandKind::None),
    OpcodeInfo::new("ishr", OperandKind::None),
    OpcodeInfo::new("lshr", OperandKind::None),
    OpcodeInfo::new("iushr", OperandKind::None),
    OpcodeInfo::new("lushr", OperandKind::None),
    OpcodeInfo::new("iand", OperandKind::None),
    OpcodeInfo::new("land", OperandKind::None),
    OpcodeInfo::new("ior", OperandKind::None),
    OpcodeInfo::new("lor", OperandKind::None),
    OpcodeInfo::new("ixor", OperandKind::None),
    OpcodeInfo::new("lxor", OperandKind::None),
    OpcodeInfo::new("iinc", OperandKind::Iinc),
    OpcodeInfo::new("i2l", OperandKind::None),
    OpcodeInfo::new("i2f", OperandKind::None),
    OpcodeInfo::new("i2d", OperandKind::None),
    OpcodeInfo::new("l2i", OperandKind::None),
    OpcodeInfo::new("l2f", OperandKind::None),
    OpcodeInfo::new("l2d", OperandKind::None),
    OpcodeInfo::new("f2i", OperandKind::None),
    OpcodeInfo::new("f2l", OperandKind::None),
    OpcodeInfo::new("f2d", OperandKind::None),
    OpcodeInfo::new("d2i", OperandKind::None),
    OpcodeInfo::new("d2l", OperandKind::None),
    OpcodeInfo::new("d2f", OperandKind::None),
    OpcodeInfo::new("i2b", OperandKind::None),
    OpcodeInfo::new("i2c", OperandKind::None),
    OpcodeInfo::new("i2s", OperandKind::None),
    OpcodeInfo::new("lcmp", OperandKind::None),
    OpcodeInfo::new("fcmpl", OperandKind::None),
    OpcodeInfo::new("fcmpg", OperandKind::None),
    OpcodeInfo::new("dcmpl", OperandKind::None),
    OpcodeInfo::new("dcmpg", OperandKind::None),
    OpcodeInfo::new("ifeq", OperandKind::Branch),
    OpcodeInfo::new("ifne", OperandKind::Branch),
    OpcodeInfo::new("iflt", OperandKind::Branch),
    OpcodeInfo::new("ifge", OperandKind::Branch),
    OpcodeInfo::new("ifgt", OperandKind::Branch),
    OpcodeInfo::new("ifle", OperandKind::Branch),
    OpcodeInfo::new("if_icmpeq", OperandKind::Branch),
    OpcodeInfo::new("if_icmpne", OperandKind::Branch),
    OpcodeInfo::new("if_icmplt", OperandKind::Branch),
    OpcodeInfo::new("if_icmpge", OperandKind::Branch),
    OpcodeInfo::new("if_icmpgt", OperandKind::Branch),
    OpcodeInfo::new("if_icmple", OperandKind::Branch),
    OpcodeInfo::new("if_acmpeq", OperandKind::Branch),
    OpcodeInfo::new("if_acmpne", OperandKind::Branch),
    OpcodeInfo::new("goto", OperandKind::Branch),
    OpcodeInfo::new("jsr", OperandKind::Branch),
    OpcodeInfo::new("ret", OperandKind::Local),
    OpcodeInfo::new("tableswitch", OperandKind::TableSwitch),
    OpcodeInfo::new("lookupswitch", OperandKind::LookupSwitch),
    OpcodeInfo::new("ireturn", OperandKind::None),
    OpcodeInfo::new("lreturn", OperandKind::None),
    OpcodeInfo::new("freturn", OperandKind::None),
    OpcodeInfo::new("dreturn", OperandKind::None),
    OpcodeInfo::new("areturn", OperandKind::None),
    OpcodeInfo::new("return", OperandKind::None),
    OpcodeInfo::new("getstatic", OperandKind::Pool),
    OpcodeInfo::new("putstatic", OperandKind::Pool),
    OpcodeInfo::new("getfield", OperandKind::Pool),
    OpcodeInfo::new("putfield", OperandKind::Pool),
    OpcodeInfo::new("invokevirtual", OperandKind::Pool),
    OpcodeInfo::new("invokespecial", OperandKind::Pool),
    OpcodeInfo::new("invokestatic", OperandKind::Pool),
    OpcodeInfo::new("invokeinterface", OperandKind::Interface),
    OpcodeInfo::new("invokedynamic", OperandKind::Dynamic),
    OpcodeInfo::new("new", OperandKind::Pool),
    OpcodeInfo::new("newarray", OperandKind::ArrayType),
    OpcodeInfo::new("anewarray", OperandKind::Pool),
    OpcodeInfo::new("arraylength", OperandKind::None),
    OpcodeInfo::new("athrow", OperandKind::None),
    OpcodeInfo::new("checkcast", OperandKind::Pool),
    OpcodeInfo::new("instanceof", OperandKind::Pool),
    OpcodeInfo::new("monitorenter", OperandKind::None),
    OpcodeInfo::new("monitorexit", OperandKind::None),
    OpcodeInfo::new("wide", OperandKind::Wide),
    OpcodeInfo::new("multianewarray", OperandKind::MultiArray),
    OpcodeInfo::new("ifnull", OperandKind::Branch),
    OpcodeInfo::new("ifnonnull", OperandKind::Branch),
    OpcodeInfo::new("goto_w", OperandKind::WideBranch),
    OpcodeInfo::new("jsr_w", OperandKind::WideBranch),];

/// Look up an opcode. Returns `None` for the reserved and unassigned bytes (`0xCA..=0xFF`).
#[must_use]
pub fn info(opcode: u8) -> Option<&'static OpcodeInfo> {
    OPCODES.get(usize::from(opcode))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_constants() {
        assert_eq!(info(NOP).unwrap().mnemonic, "nop");
        assert_eq!(info(SIPUSH).unwrap().operand, OperandKind::Short);
        assert_eq!(info(IINC).unwrap().mnemonic, "iinc");
        assert_eq!(info(GOTO).unwrap().operand, OperandKind::Branch);
        assert_eq!(info(INVOKEINTERFACE).unwrap().operand, OperandKind::Interface);
        assert_eq!(info(JSR_W).unwrap().mnemonic, "jsr_w");
        assert!(info(0xCA).is_none());
        assert!(info(0xFF).is_none());
    }
}
