//! Applying patch requests to loaded types.
//!
//! [`PatchApplication`] drives each [`PatchRequest`] through three stages:
//!
//! 1. **Resolving**: load the type (once, through the [`TypeRegistry`]), declare requested
//!    fields, locate the method, resolve every symbol the request needs and check that every
//!    named local exists in the body.
//! 2. **Splicing**: perform the operations in declared order on a private copy of the body.
//!    Each anchored operation scans forward, splices, and continues scanning behind the splice
//!    on a freshly decoded revision; offsets never outlive the mutation that produced them.
//! 3. **Committing**: write the body back into the snapshot and hand the re-materialized class
//!    to the store.
//!
//! A failing request produces [`ApplyResult::Failed`] and leaves the snapshot's methods as they
//! were. Constant pool entries, catalog symbols and fields declared while resolving are not
//! rolled back.
//!
//! # Usage
//!
//! ```rust
//! use classweave::classfile::{ClassFile, CodeAttribute, MethodAccessFlags};
//! use classweave::file::MemoryTypeStore;
//! use classweave::patch::{
//!     MethodSelector, PatchApplication, PatchBuilder, PatchRequest, ValueKind,
//! };
//!
//! let mut class = ClassFile::new("demo/Gate", "java/lang/Object")?;
//! // iconst_1; ireturn
//! let body = CodeAttribute::new(1, 1, vec![0x04, 0xAC]);
//! class.add_method(MethodAccessFlags::PUBLIC, "isOpen", "()Z", Some(body))?;
//!
//! let mut store = MemoryTypeStore::new();
//! store.insert(&class)?;
//!
//! let mut application = PatchApplication::new(store);
//! let closed = PatchBuilder::new()
//!     .push_bool(false)?
//!     .return_value(ValueKind::Int)?
//!     .build()?;
//! let results = application.apply(&[
//!     PatchRequest::new("demo.Gate", MethodSelector::method("isOpen", "()Z")).set_body(closed),
//! ]);
//! assert!(results[0].is_success());
//! # Ok::<(), classweave::Error>(())
//! ```

use std::{collections::HashMap, fmt::Write as _};

use log::{debug, info, warn};
use sha1::{Digest, Sha1};

use crate::{
    classfile::{internal_name, ClassFile, CodeAttribute, FieldAccessFlags},
    file::TypeStore,
    patch::{
        builder::Sequence,
        catalog::SymbolCatalog,
        codeview::CodeView,
        locator::{MethodHandle, MethodLocator},
        request::{
            Anchor, ApplyResult, MemberTarget, PatchFailure, PatchOperation, PatchRequest,
            PatchSummary, Placement, Stage,
        },
        slots::SlotResolver,
    },
    Error, Result,
};

/// A loaded type together with the symbols resolved against it.
#[derive(Debug)]
pub struct TypeSnapshot {
    /// The current revision of the type
    pub class: ClassFile,
    /// Symbols interned into the type's constant pool
    pub catalog: SymbolCatalog,
}

impl TypeSnapshot {
    /// Wrap a freshly loaded class with an empty catalog.
    #[must_use]
    pub fn new(class: ClassFile) -> Self {
        TypeSnapshot {
            class,
            catalog: SymbolCatalog::new(),
        }
    }
}

/// Loads each type at most once and keeps its snapshot for later requests.
pub struct TypeRegistry<S: TypeStore> {
    store: S,
    snapshots: HashMap<String, TypeSnapshot>,
}

impl<S: TypeStore> TypeRegistry<S> {
    /// Create a registry over `store`.
    pub fn new(store: S) -> Self {
        TypeRegistry {
            store,
            snapshots: HashMap::new(),
        }
    }

    /// The snapshot of `name`, loading it from the store on first use.
    ///
    /// # Errors
    /// Returns the store's errors, typically [`crate::Error::TypeNotFound`].
    pub fn snapshot(&mut self, name: &str) -> Result<&mut TypeSnapshot> {
        let name = internal_name(name);
        if !self.snapshots.contains_key(&name) {
            let class = self.store.load(&name)?;
            debug!("loaded {name} ({} methods)", class.methods.len());
            self.snapshots.insert(name.clone(), TypeSnapshot::new(class));
        }
        self.snapshots
            .get_mut(&name)
            .ok_or(Error::TypeNotFound(name))
    }

    /// The snapshot of `name` if it has been loaded.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypeSnapshot> {
        self.snapshots.get(&internal_name(name))
    }

    /// Hand the current revision of `name` to the store. Returns the SHA-1 of the encoded
    /// class as lowercase hex.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeNotFound`] if `name` was never loaded, encoding errors and the
    /// store's errors.
    pub fn commit(&mut self, name: &str) -> Result<String> {
        let name = internal_name(name);
        let Some(snapshot) = self.snapshots.get(&name) else {
            return Err(Error::TypeNotFound(name));
        };

        let bytes = snapshot.class.to_bytes()?;
        self.store.define_bytes(&name, &bytes)?;
        Ok(sha1_hex(&bytes))
    }

    /// Number of loaded types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns true if no type has been loaded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give up the snapshots and return the backing store.
    pub fn into_store(self) -> S {
        self.store
    }
}

fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

type StageResult<T> = std::result::Result<T, (Stage, Error)>;

fn at<T>(stage: Stage, result: Result<T>) -> StageResult<T> {
    result.map_err(|error| (stage, error))
}

/// The patching engine.
///
/// Requests are applied strictly one after the other; within a request, one method body has
/// exactly one owner at a time.
pub struct PatchApplication<S: TypeStore> {
    registry: TypeRegistry<S>,
}

impl<S: TypeStore> PatchApplication<S> {
    /// Create an engine loading types from `store`.
    pub fn new(store: S) -> Self {
        PatchApplication {
            registry: TypeRegistry::new(store),
        }
    }

    /// The loaded snapshots.
    pub fn registry(&self) -> &TypeRegistry<S> {
        &self.registry
    }

    /// Give up the snapshots and return the backing store.
    pub fn into_store(self) -> S {
        self.registry.into_store()
    }

    /// Apply `requests` in order. One result per request, in the same order.
    pub fn apply(&mut self, requests: &[PatchRequest]) -> Vec<ApplyResult> {
        requests
            .iter()
            .map(|request| self.apply_one(request))
            .collect()
    }

    /// Apply a single request.
    pub fn apply_one(&mut self, request: &PatchRequest) -> ApplyResult {
        let mut method = request.method.to_string();
        match self.run(request, &mut method) {
            Ok(summary) => {
                info!(
                    "patched {}.{}: {} splices, {} bytes, sha1 {}",
                    summary.type_name,
                    summary.method,
                    summary.splices,
                    summary.code_length,
                    summary.digest
                );
                ApplyResult::Succeeded(summary)
            }
            Err((stage, reason)) => {
                let failure = PatchFailure {
                    stage,
                    type_name: request.type_name.clone(),
                    method,
                    reason,
                };
                warn!("{failure}");
                ApplyResult::Failed(failure)
            }
        }
    }

    fn run(&mut self, request: &PatchRequest, method: &mut String) -> StageResult<PatchSummary> {
        let snapshot = at(Stage::Resolving, self.registry.snapshot(&request.type_name))?;
        let (handle, code) = at(Stage::Resolving, resolve(snapshot, request))?;
        *method = handle.to_string();

        let (code, splices) = at(Stage::Splicing, splice(snapshot, request, &handle, code))?;
        let code_length = code.code.len();

        let class = &mut snapshot.class;
        let previous = class.methods[handle.index].clone();
        at(
            Stage::Committing,
            class.methods[handle.index].set_code(&mut class.constant_pool, &code),
        )?;

        match self.registry.commit(&request.type_name) {
            Ok(digest) => Ok(PatchSummary {
                type_name: request.type_name.clone(),
                method: method.clone(),
                splices,
                code_length,
                digest,
            }),
            Err(error) => {
                let name = internal_name(&request.type_name);
                if let Some(snapshot) = self.registry.snapshots.get_mut(&name) {
                    snapshot.class.methods[handle.index] = previous;
                }
                Err((Stage::Committing, error))
            }
        }
    }
}

fn resolve(snapshot: &mut TypeSnapshot, request: &PatchRequest) -> Result<(MethodHandle, CodeAttribute)> {
    let TypeSnapshot { class, catalog } = snapshot;

    for operation in &request.operations {
        if let PatchOperation::AddField {
            access,
            name,
            descriptor,
        } = operation
        {
            declare_field(class, *access, name, descriptor)?;
        }
    }

    let handle = MethodLocator::new(class).select(&request.method)?;

    for symbol in request.required_symbols() {
        catalog.resolve(class, symbol)?;
    }

    let code = class.methods[handle.index].code(&class.constant_pool)?;
    let slots = SlotResolver::new(&code, &class.constant_pool)?;
    for name in request.named_locals() {
        if !slots.knows(name) {
            return Err(Error::VariableNotFound {
                name: name.to_string(),
                offset: 0,
            });
        }
    }

    Ok((handle, code))
}

fn declare_field(
    class: &mut ClassFile,
    access: FieldAccessFlags,
    name: &str,
    descriptor: &str,
) -> Result<()> {
    let existing = match class.find_field(name) {
        Some(field) => Some(field.descriptor(&class.constant_pool)?.to_string()),
        None => None,
    };

    match existing {
        Some(declared) if declared == descriptor => Ok(()),
        Some(declared) => Err(Error::SymbolNotResolvable(format!(
            "field {name} is already declared on {} as {declared}",
            class.name()?
        ))),
        None => {
            class.add_field(access, name, descriptor)?;
            debug!("declared field {name}:{descriptor} on {}", class.name()?);
            Ok(())
        }
    }
}

/// Working state of the splicing stage for one method body.
struct Splicer<'a> {
    class: &'a mut ClassFile,
    catalog: &'a SymbolCatalog,
    handle: &'a MethodHandle,
    view: CodeView,
    splices: usize,
}

fn splice(
    snapshot: &mut TypeSnapshot,
    request: &PatchRequest,
    handle: &MethodHandle,
    code: CodeAttribute,
) -> Result<(CodeAttribute, usize)> {
    let TypeSnapshot { class, catalog } = snapshot;
    let mut splicer = Splicer {
        class,
        catalog,
        handle,
        view: CodeView::new(code),
        splices: 0,
    };

    for operation in &request.operations {
        let before = splicer.splices;
        match operation {
            PatchOperation::ReplaceCall { target, sequence } => {
                splicer.replace_each(target, sequence, false)?;
            }
            PatchOperation::ReplaceField { target, sequence } => {
                splicer.replace_each(target, sequence, true)?;
            }
            PatchOperation::InsertAt {
                anchor,
                placement,
                sequence,
            } => splicer.insert_each(anchor, *placement, sequence)?,
            PatchOperation::SetBody { sequence } => splicer.set_body(sequence)?,
            PatchOperation::AddField { .. } => continue,
        }

        if splicer.splices == before {
            return Err(Error::AnchorNotFound(format!(
                "{operation} in {}",
                splicer.handle
            )));
        }
    }

    Ok((splicer.view.into_code(), splicer.splices))
}

impl Splicer<'_> {
    fn slots(&self) -> Result<SlotResolver> {
        SlotResolver::new(self.view.code(), &self.class.constant_pool)
    }

    fn replace_each(&mut self, target: &MemberTarget, sequence: &Sequence, field: bool) -> Result<()> {
        let mut cursor = 0;
        loop {
            let pool = &self.class.constant_pool;
            let found = if field {
                target.next_access(&self.view, pool, cursor)?
            } else {
                target.next_call(&self.view, pool, cursor)?
            };
            let Some(instruction) = found else {
                return Ok(());
            };

            let slots = self.slots()?;
            let assembled = sequence.assemble(self.catalog, self.class, &slots, instruction.offset)?;
            let length =
                self.view
                    .replace_call(&self.class.constant_pool, instruction.offset, &assembled)?;
            self.splices += 1;
            cursor = instruction.offset + length;
        }
    }

    fn insert_each(&mut self, anchor: &Anchor, placement: Placement, sequence: &Sequence) -> Result<()> {
        let mut cursor = 0;
        loop {
            let Some(instruction) = anchor.next(&self.view, &self.class.constant_pool, cursor)? else {
                return Ok(());
            };

            let offset = match placement {
                Placement::Before => instruction.offset,
                Placement::After => instruction.end(),
            };
            let slots = self.slots()?;
            let assembled = sequence.assemble(self.catalog, self.class, &slots, offset)?;
            let pool = &self.class.constant_pool;
            let gap = match placement {
                Placement::Before => self.view.insert_before(pool, &instruction, &assembled)?,
                Placement::After => self.view.insert_after(pool, &instruction, &assembled)?,
            };
            self.splices += 1;

            if anchor.is_fixed() {
                return Ok(());
            }
            cursor = match placement {
                Placement::Before => offset + gap + instruction.size,
                Placement::After => offset + gap,
            };
        }
    }

    fn set_body(&mut self, sequence: &Sequence) -> Result<()> {
        let slots = self.slots()?;
        let assembled = sequence.assemble(self.catalog, self.class, &slots, 0)?;
        self.view
            .set_body_sequence(&assembled, self.handle.argument_slots())?;
        self.splices += 1;
        Ok(())
    }
}
