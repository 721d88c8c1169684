//! The hard-error tier (§7, tier 1): failures that abort inference outright
//! rather than producing a mark. There is exactly one kind of situation
//! that rises to this level — malformed input that no amount of `Unknown`
//! substitution can paper over, such as a declaration referencing a node id
//! that never appears in the program being registered against.

use std::fmt;

/// An error severe enough to abort `infer_program` entirely.
#[derive(Clone, Debug)]
pub enum ContractError {
    /// A mutual-recursion group names a member that isn't a `let`
    /// declaration in the same program.
    UnknownMutualGroupMember { name: String },
    /// A carrier annotation names a domain that was already registered
    /// under a different nominal type.
    DuplicateCarrierDomain { domain: String },
    /// A type declaration redefines a name already bound to another type.
    DuplicateTypeName { name: String },
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractError::UnknownMutualGroupMember { name } => {
                write!(f, "mutual recursion group references unknown let `{}`", name)
            }
            ContractError::DuplicateCarrierDomain { domain } => {
                write!(f, "carrier domain `{}` registered more than once", domain)
            }
            ContractError::DuplicateTypeName { name } => {
                write!(f, "type `{}` declared more than once", name)
            }
        }
    }
}

impl std::error::Error for ContractError {}
