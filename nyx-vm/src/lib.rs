//! # Nyx VM
//!
//! The runtime half of the Nyx scripting language: bytecode definitions, the
//! `.nxb` binary container, the stack interpreter, the personality state
//! machine, and the collaborator client contracts.
//!
//! ## Core Concepts
//! - **CompiledUnit**: code + constant pool + symbol table + metadata, the
//!   unit of execution and of persistence
//! - **Container**: deterministic, versioned binary framing of a unit
//! - **Vm**: single-threaded opcode dispatcher with explicit suspension at
//!   collaborator opcodes
//! - **Personality**: bounded trait vector feeding the decision opcode
//! - **Collaborators**: injected knowledge/voice capability objects - the VM
//!   knows nothing about HTTP or credentials

pub mod bytecode;
pub mod collaborator;
pub mod container;
pub mod error;
pub mod personality;
pub mod stack;
pub mod storage;
pub mod value;
pub mod vm;

pub use bytecode::{CompiledUnit, Constant, Instruction, Op, Symbol, SymbolKind};
pub use collaborator::{
    AudioHandle, CollaboratorConfig, ConsoleVoice, HttpKnowledgeClient, HttpVoiceClient,
    KnowledgeAnswer, KnowledgeClient, MockVoice, StaticKnowledge, VoiceClient,
};
pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use personality::{Personality, Trait, TraitChange, ADAPT_STEP, HISTORY_CAP, TRAIT_COUNT};
pub use stack::{Stack, MAX_STACK_SIZE};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageBackend};
pub use value::{Tensor, Value};
pub use vm::{FaultInfo, LogLevel, Vm, VmState, MAX_CALL_DEPTH};
