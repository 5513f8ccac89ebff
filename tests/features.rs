//! Integration tests for the bundled features.
//!
//! Each host type is a minimal stand-in for the server class it patches: only the members the
//! feature looks for, compiled the way the server compiles them.

use classweave::{assembly::opcodes::*, prelude::*};

const SERVER: &str = "com/wurmonline/server";

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn server(path: &str) -> String {
    format!("{SERVER}/{path}")
}

fn member_ref(
    class: &mut ClassFile,
    kind: MemberKind,
    owner: &str,
    name: &str,
    descriptor: &str,
) -> Result<[u8; 2]> {
    Ok(class
        .constant_pool
        .member_ref_index(kind, owner, name, descriptor)?
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

fn village_foundation() -> Result<ClassFile> {
    let name = server("questions/VillageFoundationQuestion");
    let mut class = ClassFile::new(&name, &server("questions/Question"))?;
    let creatures = "checkBlockingCreatures";
    let [ch, cl] = member_ref(&mut class, MemberKind::Method, &name, creatures, "()Z")?;
    let items = "checkBlockingItems";
    let [ih, il] = member_ref(&mut class, MemberKind::Method, &name, items, "()Z")?;

    // 0: aload_0  1: invokevirtual checkBlockingCreatures  4: ifne 9  7: iconst_1  8: ireturn
    // 9: aload_0  10: invokevirtual checkBlockingItems  13: ifne 18  16: iconst_1  17: ireturn
    // 18: iconst_0  19: ireturn
    let code = CodeAttribute::new(
        1,
        1,
        vec![
            ALOAD_0, INVOKEVIRTUAL, ch, cl, IFNE, 0x00, 0x05, ICONST_1, IRETURN, ALOAD_0,
            INVOKEVIRTUAL, ih, il, IFNE, 0x00, 0x05, ICONST_1, IRETURN, ICONST_0, IRETURN,
        ],
    );
    class.add_method(MethodAccessFlags::PRIVATE, "answersFail", "()Z", Some(code))?;
    Ok(class)
}

fn terraforming() -> Result<ClassFile> {
    let name = server("behaviours/Terraforming");
    let mut class = ClassFile::new(&name, "java/lang/Object")?;
    let items = server("endgames/EndGameItems");
    let altar = format!("()L{SERVER}/endgames/EndGameItem;");
    let [eh, el] = member_ref(&mut class, MemberKind::Method, &items, "getEvilAltar", &altar)?;
    let [gh, gl] = member_ref(&mut class, MemberKind::Method, &items, "getGoodAltar", &altar)?;

    // 0: invokestatic getEvilAltar  3: ifnonnull 12  6: invokestatic getGoodAltar
    // 9: ifnull 14  12: iconst_1  13: ireturn  14: iconst_0  15: ireturn
    let code = CodeAttribute::new(
        1,
        3,
        vec![
            INVOKESTATIC, eh, el, IFNONNULL, 0x00, 0x09, INVOKESTATIC, gh, gl, IFNULL, 0x00, 0x05,
            ICONST_1, IRETURN, ICONST_0, IRETURN,
        ],
    );
    class.add_method(
        MethodAccessFlags::STATIC,
        "isAltarBlocking",
        &format!("(L{SERVER}/creatures/Creature;II)Z"),
        Some(code),
    )?;
    Ok(class)
}

fn tile_rock_behaviour() -> Result<ClassFile> {
    let name = server("behaviours/TileRockBehaviour");
    let mut class = ClassFile::new(&name, &server("behaviours/TileBehaviour"))?;
    let entry = server("ServerEntry");
    let [sh, sl] = member_ref(
        &mut class,
        MemberKind::Field,
        &server("Servers"),
        "localServer",
        &format!("L{entry};"),
    )?;
    let [ph, pl] = member_ref(&mut class, MemberKind::Field, &entry, "PVPSERVER", "Z")?;

    // 0: getstatic localServer  3: getfield PVPSERVER  6: ireturn
    let code = CodeAttribute::new(1, 4, vec![GETSTATIC, sh, sl, GETFIELD, ph, pl, IRETURN]);
    class.add_method(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "cannotMineSlope",
        &format!("(L{SERVER}/creatures/Creature;L{SERVER}/skills/Skill;II)Z"),
        Some(code),
    )?;
    Ok(class)
}

fn mail_send_confirm() -> Result<ClassFile> {
    let name = server("questions/MailSendConfirmQuestion");
    let mut class = ClassFile::new(&name, &server("questions/Question"))?;

    // 0: bipush 100  2: ireturn
    let code = CodeAttribute::new(1, 3, vec![BIPUSH, 100, IRETURN]);
    class.add_method(
        MethodAccessFlags::PRIVATE,
        "getCostForItem",
        &format!("(L{SERVER}/items/Item;F)I"),
        Some(code),
    )?;
    Ok(class)
}

fn mail_receive() -> Result<ClassFile> {
    let name = server("questions/MailReceiveQuestion");
    let item = server("items/Item");
    let mut class = ClassFile::new(&name, &server("questions/Question"))?;
    let [th, tl] = member_ref(&mut class, MemberKind::Method, &item, "getTemplateId", "()I")?;
    let [vh, vl] = member_ref(
        &mut class,
        MemberKind::Method,
        "java/lang/String",
        "valueOf",
        "(I)Ljava/lang/String;",
    )?;

    // 0: bipush 100  2: istore_2  3: aload_0  4: invokevirtual getTemplateId  7: iload_2
    // 8: iadd  9: pop  10: return
    let mut answer = CodeAttribute::new(
        2,
        3,
        vec![
            BIPUSH, 100, ISTORE_2, ALOAD_0, INVOKEVIRTUAL, th, tl, ILOAD_2, IADD, POP, RETURN,
        ],
    );
    answer.add_local_variable(&mut class.constant_pool, "this", &format!("L{name};"), 0, 11, 0)?;
    answer.add_local_variable(&mut class.constant_pool, "pcost", "I", 3, 8, 2)?;
    class.add_method(
        MethodAccessFlags::PUBLIC,
        "answer",
        "(Ljava/util/Properties;)V",
        Some(answer),
    )?;

    // 0: bipush 100  2: istore 5  4: aload_2  5: invokevirtual getTemplateId  8: iload 5
    // 10: invokestatic valueOf  13: areturn
    let mut add_item = CodeAttribute::new(
        2,
        6,
        vec![
            BIPUSH, 100, ISTORE, 5, ALOAD_2, INVOKEVIRTUAL, th, tl, ILOAD, 5, INVOKESTATIC, vh, vl,
            ARETURN,
        ],
    );
    add_item.add_local_variable(&mut class.constant_pool, "pcost", "I", 4, 10, 5)?;
    class.add_method(
        MethodAccessFlags::PRIVATE,
        "addItem",
        &format!("(Ljava/lang/String;L{item};L{SERVER}/items/WurmMail;Z)Ljava/lang/String;"),
        Some(add_item),
    )?;
    Ok(class)
}

fn item() -> Result<ClassFile> {
    let name = server("items/Item");
    let mut class = ClassFile::new(&name, "java/lang/Object")?;
    let [lh, ll] = member_ref(&mut class, MemberKind::Method, &name, "isLarge", "()Z")?;

    // 0: aload_0  1: invokevirtual isLarge  4: ifeq 13  7: sipush 300  10: iconst_2  11: isub
    // 12: ireturn  13: sipush 150  16: iconst_2  17: isub  18: ireturn
    let code = CodeAttribute::new(
        2,
        1,
        vec![
            ALOAD_0, INVOKEVIRTUAL, lh, ll, IFEQ, 0x00, 0x09, SIPUSH, 0x01, 0x2C, ICONST_2, ISUB,
            IRETURN, SIPUSH, 0x00, 0x96, ICONST_2, ISUB, IRETURN,
        ],
    );
    class.add_method(
        MethodAccessFlags::PUBLIC,
        "getRemainingCrateSpace",
        "()I",
        Some(code),
    )?;
    Ok(class)
}

fn server_store() -> Result<MemoryTypeStore> {
    init();
    let mut store = MemoryTypeStore::new();
    for class in [
        village_foundation()?,
        terraforming()?,
        tile_rock_behaviour()?,
        mail_send_confirm()?,
        mail_receive()?,
        item()?,
    ] {
        store.insert(&class)?;
    }
    Ok(store)
}

fn patched(config: &FeatureConfig) -> Result<(Vec<ApplyResult>, MemoryTypeStore)> {
    let mut application = PatchApplication::new(server_store()?);
    let results = FeatureSet::from_config(config).apply(&mut application)?;
    Ok((results, application.into_store()))
}

#[test]
fn all_features_on_a_partial_server() -> Result<()> {
    let (results, _) = patched(&FeatureConfig::default())?;
    assert_eq!(results.len(), 11);

    // MethodsStructure is not part of the fixture.
    let failures: Vec<&PatchFailure> = results.iter().filter_map(ApplyResult::failure).collect();
    assert_eq!(failures.len(), 2);
    for failure in failures {
        assert_eq!(failure.stage, Stage::Resolving);
        assert!(matches!(
            &failure.reason,
            Error::TypeNotFound(name) if name.ends_with("MethodsStructure")
        ));
    }
    Ok(())
}

#[test]
fn blocking_checks_always_pass() -> Result<()> {
    let config = FeatureConfig::disabled().with_no_holy_ground(true);
    let (_, store) = patched(&config)?;

    let class = store.load(&server("questions/VillageFoundationQuestion"))?;
    assert_eq!(
        method_code(&class, "answersFail")?.code,
        vec![
            ALOAD_0, POP, ICONST_1, IFNE, 0x00, 0x05, ICONST_1, IRETURN, ALOAD_0, POP, ICONST_1,
            IFNE, 0x00, 0x05, ICONST_1, IRETURN, ICONST_0, IRETURN,
        ]
    );

    let class = store.load(&server("behaviours/Terraforming"))?;
    assert_eq!(
        method_code(&class, "isAltarBlocking")?.code,
        vec![
            ACONST_NULL, IFNONNULL, 0x00, 0x07, ACONST_NULL, IFNULL, 0x00, 0x05, ICONST_1,
            IRETURN, ICONST_0, IRETURN,
        ]
    );
    Ok(())
}

#[test]
fn pvp_flag_reads_false() -> Result<()> {
    let config = FeatureConfig::disabled().with_pvp_surface_mining_slope(true);
    let (results, store) = patched(&config)?;
    assert!(results.iter().all(ApplyResult::is_success));

    let class = store.load(&server("behaviours/TileRockBehaviour"))?;
    let code = method_code(&class, "cannotMineSlope")?;
    assert_eq!(code.code[3..], [POP, ICONST_0, IRETURN]);
    Ok(())
}

#[test]
fn mail_is_free() -> Result<()> {
    let config = FeatureConfig::disabled().with_no_mail_cost(true);
    let (results, store) = patched(&config)?;
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(ApplyResult::is_success));

    let class = store.load(&server("questions/MailSendConfirmQuestion"))?;
    let cost = method_code(&class, "getCostForItem")?;
    assert_eq!(cost.code, vec![ICONST_0, IRETURN]);
    assert_eq!(cost.max_locals, 3);

    let class = store.load(&server("questions/MailReceiveQuestion"))?;
    assert_eq!(
        method_code(&class, "answer")?.code[3..7],
        [ALOAD_0, ICONST_0, ISTORE_2, INVOKEVIRTUAL]
    );
    assert_eq!(
        method_code(&class, "addItem")?.code[4..9],
        [ALOAD_2, ICONST_0, ISTORE, 5, INVOKEVIRTUAL]
    );
    Ok(())
}

#[test]
fn crate_literals_are_scaled() -> Result<()> {
    let config = FeatureConfig::disabled().with_crate_factor(2);
    let (_, store) = patched(&config)?;

    let class = store.load(&server("items/Item"))?;
    let code = method_code(&class, "getRemainingCrateSpace")?;
    assert_eq!(code.code.len(), 23);
    assert_eq!(code.code[10..12], [ICONST_2, IMUL]);
    assert_eq!(code.code[18..20], [ICONST_2, IMUL]);

    let instructions = decode_stream(&code.code)?;
    assert_eq!(instructions[2].branch_targets(), vec![15]);
    Ok(())
}

#[test]
fn crate_factor_matching_a_capacity_is_applied_once() -> Result<()> {
    let config = FeatureConfig::disabled().with_crate_factor(300);
    let (results, _) = patched(&config)?;
    assert_eq!(results[0].summary().map(|s| s.splices), Some(2));
    Ok(())
}
