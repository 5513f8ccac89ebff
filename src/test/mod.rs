//! Fixture builders shared by the unit tests.
//!
//! Bodies are written out as raw bytes with their offsets in comments, so tests can assert on
//! exact positions after a splice.

use crate::{
    assembly::opcodes::*,
    classfile::{
        ClassFile, CodeAttribute, FieldAccessFlags, MemberKind, MethodAccessFlags,
        CONSTRUCTOR_NAME,
    },
};

/// Pool index of a member reference, big-endian, ready to follow an opcode.
pub fn member_ref(
    class: &mut ClassFile,
    kind: MemberKind,
    owner: &str,
    name: &str,
    descriptor: &str,
) -> [u8; 2] {
    class
        .constant_pool
        .member_ref_index(kind, owner, name, descriptor)
        .unwrap()
        .to_be_bytes()
}

pub fn method_ref(class: &mut ClassFile, owner: &str, name: &str, descriptor: &str) -> [u8; 2] {
    member_ref(class, MemberKind::Method, owner, name, descriptor)
}

pub fn add_method(
    class: &mut ClassFile,
    access: MethodAccessFlags,
    name: &str,
    descriptor: &str,
    code: CodeAttribute,
) -> usize {
    class.add_method(access, name, descriptor, Some(code)).unwrap()
}

/// Decoded body of the first method called `name`.
pub fn method_code(class: &ClassFile, name: &str) -> CodeAttribute {
    class
        .methods
        .iter()
        .find(|method| method.name(&class.constant_pool).unwrap() == name)
        .unwrap()
        .code(&class.constant_pool)
        .unwrap()
}

/// Raw `Code` payload of the first method called `name`.
pub fn method_bytes(class: &ClassFile, name: &str) -> Vec<u8> {
    class
        .methods
        .iter()
        .find(|method| method.name(&class.constant_pool).unwrap() == name)
        .and_then(|method| method.raw_code(&class.constant_pool))
        .unwrap()
        .to_vec()
}

/// `host/Mailbox`, a small class with one method per patching scenario.
///
/// ```text
/// <init>()V         aload_0; invokespecial Object.<init>; return
/// fee(I)I  static   0: iload_0  1: invokestatic clamp  4: iload_0  5: invokestatic clamp
///                   8: iadd     9: ireturn
/// isFull()Z         0: aload_0  1: invokevirtual checkQuota()Z  4: ireturn
/// deliver(I)I       0: bipush 20  2: istore_2  3: aload_0  4: invokevirtual getTemplateId()I
///                   7: iload_2  8: iadd  9: ireturn       (pcost in slot 2 over [3, 10))
/// ```
pub fn create_mailbox() -> ClassFile {
    let mut class = ClassFile::new("host/Mailbox", "java/lang/Object").unwrap();
    class
        .add_field(FieldAccessFlags::PRIVATE, "capacity", "I")
        .unwrap();

    let [hi, lo] = method_ref(&mut class, "java/lang/Object", CONSTRUCTOR_NAME, "()V");
    add_method(
        &mut class,
        MethodAccessFlags::PUBLIC,
        CONSTRUCTOR_NAME,
        "()V",
        CodeAttribute::new(1, 1, vec![ALOAD_0, INVOKESPECIAL, hi, lo, RETURN]),
    );

    let [hi, lo] = method_ref(&mut class, "host/Lib", "clamp", "(I)I");
    let mut fee = CodeAttribute::new(
        2,
        1,
        vec![
            ILOAD_0, INVOKESTATIC, hi, lo, ILOAD_0, INVOKESTATIC, hi, lo, IADD, IRETURN,
        ],
    );
    fee.add_line_number(&mut class.constant_pool, 0, 10).unwrap();
    fee.add_line_number(&mut class.constant_pool, 4, 11).unwrap();
    add_method(
        &mut class,
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "fee",
        "(I)I",
        fee,
    );

    let [hi, lo] = method_ref(&mut class, "host/Mailbox", "checkQuota", "()Z");
    add_method(
        &mut class,
        MethodAccessFlags::PUBLIC,
        "isFull",
        "()Z",
        CodeAttribute::new(1, 1, vec![ALOAD_0, INVOKEVIRTUAL, hi, lo, IRETURN]),
    );

    let [hi, lo] = method_ref(&mut class, "host/Mailbox", "getTemplateId", "()I");
    let mut deliver = CodeAttribute::new(
        2,
        3,
        vec![
            BIPUSH, 20, ISTORE_2, ALOAD_0, INVOKEVIRTUAL, hi, lo, ILOAD_2, IADD, IRETURN,
        ],
    );
    let pool = &mut class.constant_pool;
    deliver
        .add_local_variable(pool, "this", "Lhost/Mailbox;", 0, 10, 0)
        .unwrap();
    deliver
        .add_local_variable(pool, "amount", "I", 0, 10, 1)
        .unwrap();
    deliver
        .add_local_variable(pool, "pcost", "I", 3, 7, 2)
        .unwrap();
    add_method(
        &mut class,
        MethodAccessFlags::PUBLIC,
        "deliver",
        "(I)I",
        deliver,
    );

    class
}
