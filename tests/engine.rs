//! Integration tests for the patching engine.
//!
//! These tests build small host types through the public class file API, run requests against
//! them through a [`MemoryTypeStore`] and inspect the committed bytes.

use classweave::{
    assembly::opcodes::*,
    classfile::ExceptionTableEntry,
    patch::{SlotResolver, SymbolCatalog},
    prelude::*,
};

const SCALE: &str = "demo/Scale";
const LIB: &str = "demo/Lib";

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn method_ref(class: &mut ClassFile, owner: &str, name: &str, descriptor: &str) -> Result<[u8; 2]> {
    Ok(class
        .constant_pool
        .member_ref_index(MemberKind::Method, owner, name, descriptor)?
        .to_be_bytes())
}

fn method_code(class: &ClassFile, name: &str) -> Result<CodeAttribute> {
    for method in &class.methods {
        if method.name(&class.constant_pool)? == name {
            return method.code(&class.constant_pool);
        }
    }
    Err(Error::MethodNotFound {
        type_name: class.name()?.to_string(),
        method: name.to_string(),
    })
}

fn raw_code(class: &ClassFile, name: &str) -> Result<Vec<u8>> {
    for method in &class.methods {
        if method.name(&class.constant_pool)? == name {
            return Ok(method
                .raw_code(&class.constant_pool)
                .map(<[u8]>::to_vec)
                .unwrap_or_default());
        }
    }
    Ok(Vec::new())
}

/// `demo/Scale` with four methods:
///
/// - `scale(I)I`: one `clamp` call at offset 1
/// - `twice(I)I`: `clamp` calls at offsets 1 and 5
/// - `check()Z`: a conditional branch, an exception handler and a line table
/// - `pick(II)I`: the local `total` in slot 2 over `[2, 4)` and in slot 3 over `[6, 8)`
fn scale_class() -> Result<ClassFile> {
    let mut class = ClassFile::new(SCALE, "java/lang/Object")?;
    let statics = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;
    let [ch, cl] = method_ref(&mut class, LIB, "clamp", "(I)I")?;

    // 0: iload_0  1: invokestatic clamp  4: ireturn
    let mut scale = CodeAttribute::new(1, 1, vec![ILOAD_0, INVOKESTATIC, ch, cl, IRETURN]);
    scale.add_line_number(&mut class.constant_pool, 0, 5)?;
    class.add_method(statics, "scale", "(I)I", Some(scale))?;

    // 0: iload_0  1: invokestatic clamp  4: iload_0  5: invokestatic clamp  8: iadd  9: ireturn
    let twice = CodeAttribute::new(
        2,
        1,
        vec![
            ILOAD_0, INVOKESTATIC, ch, cl, ILOAD_0, INVOKESTATIC, ch, cl, IADD, IRETURN,
        ],
    );
    class.add_method(statics, "twice", "(I)I", Some(twice))?;

    // 0: aload_0  1: invokevirtual isOpen  4: ifeq 9  7: iconst_1  8: ireturn
    // 9: iconst_0  10: ireturn
    let [oh, ol] = method_ref(&mut class, SCALE, "isOpen", "()Z")?;
    let mut check = CodeAttribute::new(
        1,
        1,
        vec![
            ALOAD_0, INVOKEVIRTUAL, oh, ol, IFEQ, 0x00, 0x05, ICONST_1, IRETURN, ICONST_0,
            IRETURN,
        ],
    );
    check.exception_table.push(ExceptionTableEntry {
        start_pc: 0,
        end_pc: 4,
        handler_pc: 9,
        catch_type: 0,
    });
    check.add_line_number(&mut class.constant_pool, 0, 20)?;
    check.add_line_number(&mut class.constant_pool, 9, 21)?;
    class.add_method(MethodAccessFlags::PUBLIC, "check", "()Z", Some(check))?;

    // 0: iload_0  1: istore_2  2: iload_2  3: pop  4: iload_1  5: istore_3  6: iload_3
    // 7: ireturn
    let mut pick = CodeAttribute::new(
        1,
        4,
        vec![
            ILOAD_0, ISTORE_2, ILOAD_2, POP, ILOAD_1, ISTORE_3, ILOAD_3, IRETURN,
        ],
    );
    pick.add_local_variable(&mut class.constant_pool, "total", "I", 2, 2, 2)?;
    pick.add_local_variable(&mut class.constant_pool, "total", "I", 6, 2, 3)?;
    class.add_method(statics, "pick", "(II)I", Some(pick))?;

    Ok(class)
}

fn application() -> Result<PatchApplication<MemoryTypeStore>> {
    init();
    let mut store = MemoryTypeStore::new();
    store.insert(&scale_class()?)?;
    Ok(PatchApplication::new(store))
}

fn stored(application: &PatchApplication<MemoryTypeStore>) -> Result<ClassFile> {
    application.registry().store().load(SCALE)
}

fn total_probe() -> Result<Sequence> {
    PatchBuilder::new()
        .load_local(ValueKind::Int, "total")?
        .pop(ValueKind::Int)?
        .build()
}

#[test]
fn symbol_ids_are_stable() -> Result<()> {
    let catalog = SymbolCatalog::new();
    let mut pool = ConstantPool::new();
    let min = SymbolKey::method("Lib", "min", "(II)I");

    assert_eq!(catalog.lookup_or_create(&mut pool, &min)?.get(), 1);
    let pool_length = pool.len();
    assert_eq!(catalog.lookup_or_create(&mut pool, &min)?.get(), 1);
    assert_eq!(pool.len(), pool_length);

    let max = SymbolKey::method("Lib", "max", "(II)I");
    assert_eq!(catalog.lookup_or_create(&mut pool, &max)?.get(), 2);
    assert_eq!(catalog.len(), 2);
    Ok(())
}

#[test]
fn insertion_moves_the_call_site_by_its_length() -> Result<()> {
    let class = scale_class()?;
    let mut view = CodeView::new(method_code(&class, "scale")?);

    let sites = view.locate_call_site(&class.constant_pool, "clamp")?;
    assert_eq!(sites, vec![1]);

    let gap = view.insert_at(sites[0], &[NOP; 5])?;
    assert_eq!(gap, 5);
    assert_eq!(view.locate_call_site(&class.constant_pool, "clamp")?, vec![6]);
    assert_eq!(view.code().line_numbers().next().map(|l| l.start_pc), Some(0));
    Ok(())
}

#[test]
fn offsets_behind_an_insertion_shift() -> Result<()> {
    let class = scale_class()?;

    let mut view = CodeView::new(method_code(&class, "twice")?);
    view.insert_at(5, &[NOP; 3])?;
    let offsets: Vec<u32> = view.instructions()?.iter().map(|i| i.offset).collect();
    assert_eq!(offsets, vec![0, 1, 4, 5, 6, 7, 8, 11, 12]);

    let mut view = CodeView::new(method_code(&class, "check")?);
    view.insert_at(7, &[NOP; 2])?;
    assert_eq!(view.instruction_at(4)?.branch_targets(), vec![11]);
    let handler = &view.code().exception_table[0];
    assert_eq!((handler.start_pc, handler.end_pc, handler.handler_pc), (0, 4, 11));
    let lines: Vec<u16> = view.code().line_numbers().map(|l| l.start_pc).collect();
    assert_eq!(lines, vec![0, 11]);
    Ok(())
}

#[test]
fn every_call_site_is_patched_once() -> Result<()> {
    let mut application = application()?;
    let probe = PatchBuilder::new()
        .push_int(7)?
        .pop(ValueKind::Int)?
        .build()?;
    let request = PatchRequest::new(SCALE, MethodSelector::method("twice", "(I)I"))
        .insert_before(Anchor::call_site("clamp"), probe);

    let results = application.apply(&[request]);
    let summary = results[0].summary().expect("request should succeed");
    assert_eq!(summary.splices, 2);
    assert_eq!(summary.code_length, 16);

    let class = stored(&application)?;
    let view = CodeView::new(method_code(&class, "twice")?);
    assert_eq!(view.locate_call_site(&class.constant_pool, "clamp")?, vec![4, 11]);
    Ok(())
}

#[test]
fn named_locals_follow_their_live_ranges() -> Result<()> {
    let mut application = application()?;
    // The later offset first, so the earlier one is not moved.
    let request = PatchRequest::new(SCALE, MethodSelector::by_name("pick"))
        .insert_before(Anchor::Offset(6), total_probe()?)
        .insert_before(Anchor::Offset(2), total_probe()?);

    let results = application.apply(&[request]);
    assert!(results[0].is_success(), "{:?}", results[0].failure());

    let class = stored(&application)?;
    let code = method_code(&class, "pick")?;
    assert_eq!(
        code.code,
        vec![
            ILOAD_0, ISTORE_2, ILOAD_2, POP, ILOAD_2, POP, ILOAD_1, ISTORE_3, ILOAD_3, POP,
            ILOAD_3, IRETURN,
        ]
    );

    let slots = SlotResolver::new(&code, &class.constant_pool)?;
    assert_eq!(slots.resolve("total", 2)?, 2);
    assert_eq!(slots.resolve("total", 8)?, 3);
    assert_eq!(slots.resolve("total", 11)?, 3);
    Ok(())
}

#[test]
fn locals_outside_their_range_are_not_found() -> Result<()> {
    let mut application = application()?;
    let request = PatchRequest::new(SCALE, MethodSelector::by_name("pick"))
        .insert_before(Anchor::Offset(4), total_probe()?);

    let results = application.apply(&[request]);
    let failure = results[0].failure().expect("request should fail");
    assert_eq!(failure.stage, Stage::Splicing);
    assert!(matches!(
        &failure.reason,
        Error::VariableNotFound { name, offset: 4 } if name == "total"
    ));
    Ok(())
}

#[test]
fn set_body_replaces_everything() -> Result<()> {
    let mut application = application()?;
    let never = PatchBuilder::new()
        .push_bool(false)?
        .return_value(ValueKind::Int)?
        .build()?;
    let request = PatchRequest::new(SCALE, MethodSelector::method("check", "()Z"))
        .set_body(never);

    let first = application.apply(std::slice::from_ref(&request));
    assert!(first[0].is_success());
    let class = stored(&application)?;
    let code = method_code(&class, "check")?;
    assert_eq!(code.code, vec![ICONST_0, IRETURN]);
    assert!(code.exception_table.is_empty());
    assert!(code.attributes.is_empty());
    assert_eq!(code.max_stack, 1);
    assert_eq!(code.max_locals, 1);

    let second = application.apply(&[request]);
    assert!(second[0].is_success());
    let again = stored(&application)?;
    assert_eq!(method_code(&again, "check")?, code);
    assert_eq!(
        first[0].summary().map(|s| s.code_length),
        second[0].summary().map(|s| s.code_length)
    );
    Ok(())
}

#[test]
fn failures_are_isolated() -> Result<()> {
    let mut application = application()?;
    let before = stored(&application)?;

    let cap = PatchBuilder::consuming(1)
        .min(IntArg::OnStack, 100)?
        .build()?;
    let requests = [
        PatchRequest::new(SCALE, MethodSelector::method("absent", "()V"))
            .set_body(PatchBuilder::new().return_void()?.build()?),
        PatchRequest::new(SCALE, MethodSelector::method("scale", "(I)I"))
            .insert_before(Anchor::call_site("clamp"), cap),
        PatchRequest::new(SCALE, MethodSelector::method("twice", "(I)I"))
            .replace_call("missing", PatchBuilder::new().push_int(0)?.build_value(1)?),
    ];

    let results = application.apply(&requests);
    let missing = results[0].failure().expect("absent method");
    assert_eq!(missing.stage, Stage::Resolving);
    assert!(matches!(missing.reason, Error::MethodNotFound { .. }));
    assert!(results[1].is_success());
    let anchor = results[2].failure().expect("absent call");
    assert!(matches!(anchor.reason, Error::AnchorNotFound(_)));
    assert!(anchor.to_string().contains("demo/Scale"));

    let after = stored(&application)?;
    for name in ["twice", "check", "pick"] {
        assert_eq!(raw_code(&before, name)?, raw_code(&after, name)?, "{name}");
    }
    assert_ne!(raw_code(&before, "scale")?, raw_code(&after, "scale")?);
    Ok(())
}

#[test]
fn declared_fields_survive_failed_requests() -> Result<()> {
    let mut application = application()?;
    let request = PatchRequest::new(SCALE, MethodSelector::by_name("absent"))
        .add_field(FieldAccessFlags::PRIVATE, "hits", "I");

    let results = application.apply(&[request]);
    assert!(!results[0].is_success());

    let snapshot = application
        .registry()
        .get(SCALE)
        .expect("type was loaded");
    assert!(snapshot.class.find_field("hits").is_some());
    Ok(())
}

/// `demo/Choice.size(Z)I`: `return flag ? 150 : 300`, both arms joining at the `ireturn`.
fn choice_application() -> Result<PatchApplication<MemoryTypeStore>> {
    init();
    let mut class = ClassFile::new("demo/Choice", "java/lang/Object")?;
    // 0: iload_0  1: ifeq 10  4: sipush 150  7: goto 13  10: sipush 300  13: ireturn
    let size = CodeAttribute::new(
        1,
        1,
        vec![
            ILOAD_0, IFEQ, 0x00, 0x09, SIPUSH, 0x00, 0x96, GOTO, 0x00, 0x06, SIPUSH, 0x01, 0x2C,
            IRETURN,
        ],
    );
    class.add_method(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "size",
        "(Z)I",
        Some(size),
    )?;

    let mut store = MemoryTypeStore::new();
    store.insert(&class)?;
    Ok(PatchApplication::new(store))
}

#[test]
fn insertions_after_a_join_arm_run_once_per_path() -> Result<()> {
    let mut application = choice_application()?;
    let double = PatchBuilder::consuming(1)
        .push_int(2)?
        .int_op(IntOp::Mul)?
        .build()?;
    let request = PatchRequest::new("demo/Choice", MethodSelector::by_name("size"))
        .insert_after(Anchor::any_literal(SIPUSH, &[150, 300]), double);

    let results = application.apply(&[request]);
    assert_eq!(results[0].summary().map(|s| s.splices), Some(2));

    let class = application.registry().store().load("demo/Choice")?;
    let code = method_code(&class, "size")?;
    assert_eq!(
        code.code,
        vec![
            ILOAD_0, IFEQ, 0x00, 0x0B, SIPUSH, 0x00, 0x96, ICONST_2, IMUL, GOTO, 0x00, 0x08,
            SIPUSH, 0x01, 0x2C, ICONST_2, IMUL, IRETURN,
        ]
    );
    let instructions = decode_stream(&code.code)?;
    assert_eq!(instructions[5].branch_targets(), vec![17]);
    Ok(())
}

#[test]
fn sequences_cannot_consume_an_empty_stack() -> Result<()> {
    let mut application = choice_application()?;
    let replace_top = PatchBuilder::consuming(1)
        .pop(ValueKind::Int)?
        .push_int(0)?
        .build()?;
    let request = PatchRequest::new("demo/Choice", MethodSelector::by_name("size"))
        .insert_before(Anchor::MethodStart, replace_top);

    let results = application.apply(&[request]);
    let failure = results[0].failure().expect("nothing is on the stack at method start");
    assert_eq!(failure.stage, Stage::Splicing);
    assert!(matches!(
        failure.reason,
        Error::StackImbalance {
            expected: 0,
            actual: 1
        }
    ));
    Ok(())
}
