//! Benchmarks for splicing method bodies.
//!
//! Measures the cost of the operations that dominate a patch run:
//! - Locating call sites in a long body
//! - Inserting raw bytes with full offset relocation
//! - Running a whole request through the engine, including commit

extern crate classweave;

use classweave::{
    assembly::opcodes::*,
    classfile::{ClassFile, CodeAttribute, MemberKind, MethodAccessFlags},
    file::MemoryTypeStore,
    patch::{Anchor, CodeView, IntArg, MethodSelector, PatchApplication, PatchBuilder, PatchRequest},
};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::hint::black_box;

const CALLS: usize = 500;

/// A static `(I)I` method that passes its argument through `clamp` `CALLS` times and ends in a
/// conditional branch.
fn host() -> (ClassFile, CodeAttribute) {
    let mut class = ClassFile::new("bench/Host", "java/lang/Object").unwrap();
    let [hi, lo] = class
        .constant_pool
        .member_ref_index(MemberKind::Method, "bench/Lib", "clamp", "(I)I")
        .unwrap()
        .to_be_bytes();

    let mut code = vec![ILOAD_0];
    for _ in 0..CALLS {
        code.extend_from_slice(&[INVOKESTATIC, hi, lo]);
    }
    code.extend_from_slice(&[DUP, IFNE, 0x00, 0x04, IRETURN, POP, ICONST_0, IRETURN]);

    let body = CodeAttribute::new(2, 1, code);
    class
        .add_method(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            "chain",
            "(I)I",
            Some(body.clone()),
        )
        .unwrap();
    (class, body)
}

fn bench_locate_call_sites(c: &mut Criterion) {
    let (class, body) = host();
    let view = CodeView::new(body);

    c.bench_function("locate_call_sites", |b| {
        b.iter(|| {
            let sites = view
                .locate_call_site(black_box(&class.constant_pool), "clamp")
                .unwrap();
            black_box(sites)
        });
    });
}

fn bench_insert_at(c: &mut Criterion) {
    let (_, body) = host();

    c.bench_function("insert_at_start", |b| {
        b.iter_batched(
            || CodeView::new(body.clone()),
            |mut view| {
                view.insert_at(0, black_box(&[NOP; 4])).unwrap();
                black_box(view)
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_apply_request(c: &mut Criterion) {
    let (class, _) = host();
    let mut store = MemoryTypeStore::new();
    store.insert(&class).unwrap();

    let cap = PatchBuilder::consuming(1)
        .min(IntArg::OnStack, 100)
        .unwrap()
        .build()
        .unwrap();
    let request = PatchRequest::new("bench/Host", MethodSelector::by_name("chain"))
        .insert_before(Anchor::call_site("clamp"), cap);

    c.bench_function("apply_insert_before_each_call", |b| {
        b.iter_batched(
            || PatchApplication::new(store.clone()),
            |mut application| {
                let results = application.apply(std::slice::from_ref(&request));
                black_box(results)
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_locate_call_sites,
    bench_insert_at,
    bench_apply_request
);
criterion_main!(benches);
