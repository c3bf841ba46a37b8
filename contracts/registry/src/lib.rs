#![no_std]

#[cfg(test)]
extern crate std;

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, log, panic_with_error,
    Address, Bytes, BytesN, Env,
};

const MAX_LABEL_LENGTH: u32 = 63;
const ZERO_ACCOUNT_STR: &str = "GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAWHF";
const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Capabilities tracked per account.
///
/// `DefaultAdmin` manages every role, `Admin` runs the registry day to day
/// (registrars, metadata, registrar pricing) and `Registrar` may record new
/// owners.
#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    DefaultAdmin,
    Admin,
    Registrar,
}

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum RegistryError {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    AccessDenied = 3,
    AlreadyRegistered = 4,
    NotRegistered = 5,
    InvalidLabel = 6,
    InvalidOwner = 7,
    SupplyExhausted = 8,
}

#[derive(Clone)]
#[contractevent(topics = ["transfer"])]
pub struct EvtTransfer {
    #[topic]
    pub label_id: BytesN<32>,
    pub from: Address,
    pub to: Address,
}

#[derive(Clone)]
#[contractevent(topics = ["label_registered"])]
pub struct EvtLabelRegistered {
    #[topic]
    pub label_id: BytesN<32>,
    pub label: Bytes,
    pub owner: Address,
}

#[derive(Clone)]
#[contractevent(topics = ["role_granted"])]
pub struct EvtRoleGranted {
    #[topic]
    pub account: Address,
    pub role: Role,
    pub sender: Address,
}

#[derive(Clone)]
#[contractevent(topics = ["role_revoked"])]
pub struct EvtRoleRevoked {
    #[topic]
    pub account: Address,
    pub role: Role,
    pub sender: Address,
}

#[derive(Clone)]
#[contractevent(topics = ["registrar_added"])]
pub struct EvtRegistrarAdded {
    #[topic]
    pub registrar: Address,
}

#[derive(Clone)]
#[contractevent(topics = ["registrar_removed"])]
pub struct EvtRegistrarRemoved {
    #[topic]
    pub registrar: Address,
}

#[derive(Clone)]
#[contractevent(topics = ["base_uri_changed"])]
pub struct EvtBaseUriChanged {
    pub base_uri: Bytes,
}

#[contract]
pub struct Registry;

#[derive(Clone)]
#[contracttype]
enum DataKey {
    Name,
    Symbol,
    BaseUri,
    Supply,
    Role(Role, Address),
    Owner(BytesN<32>),
}

fn ensure_initialized(env: &Env) {
    if !env.storage().persistent().has(&DataKey::Name) {
        panic_with_error!(env, RegistryError::NotInitialized);
    }
}

fn read_bytes(env: &Env, key: &DataKey) -> Bytes {
    env.storage()
        .persistent()
        .get(key)
        .unwrap_or_else(|| panic_with_error!(env, RegistryError::NotInitialized))
}

fn read_supply(env: &Env) -> u32 {
    env.storage().persistent().get(&DataKey::Supply).unwrap_or(0)
}

fn role_held(env: &Env, role: Role, account: &Address) -> bool {
    env.storage()
        .persistent()
        .has(&DataKey::Role(role, account.clone()))
}

fn require_role(env: &Env, role: Role, account: &Address) {
    if !role_held(env, role, account) {
        panic_with_error!(env, RegistryError::AccessDenied);
    }
}

/// Adds `account` to the role set. Returns false when it was already a member.
fn add_role(env: &Env, role: Role, account: &Address, sender: &Address) -> bool {
    if role_held(env, role, account) {
        return false;
    }
    env.storage()
        .persistent()
        .set(&DataKey::Role(role, account.clone()), &true);
    EvtRoleGranted {
        account: account.clone(),
        role,
        sender: sender.clone(),
    }
    .publish(env);
    true
}

fn drop_role(env: &Env, role: Role, account: &Address, sender: &Address) -> bool {
    if !role_held(env, role, account) {
        return false;
    }
    env.storage()
        .persistent()
        .remove(&DataKey::Role(role, account.clone()));
    EvtRoleRevoked {
        account: account.clone(),
        role,
        sender: sender.clone(),
    }
    .publish(env);
    true
}

fn hash_label(env: &Env, label: &Bytes) -> BytesN<32> {
    if label.is_empty() || label.len() > MAX_LABEL_LENGTH {
        panic_with_error!(env, RegistryError::InvalidLabel);
    }
    env.crypto().sha256(label).to_bytes()
}

fn hex_encode(env: &Env, id: &BytesN<32>) -> Bytes {
    let mut out = Bytes::new(env);
    for byte in id.to_array() {
        out.push_back(HEX_DIGITS[(byte >> 4) as usize]);
        out.push_back(HEX_DIGITS[(byte & 0x0f) as usize]);
    }
    out
}

#[contractimpl]
impl Registry {
    pub fn version(_env: Env) -> u32 {
        1
    }

    /// One-time initializer, called by the factory right after deployment.
    ///
    /// `admin` must sign. Both admin roles go to `admin` and to nobody else;
    /// in particular the deploying factory ends up with no capability on the
    /// new instance.
    pub fn init(env: Env, name: Bytes, symbol: Bytes, base_uri: Bytes, admin: Address) {
        let storage = env.storage().persistent();
        if storage.has(&DataKey::Name) {
            panic_with_error!(&env, RegistryError::AlreadyInitialized);
        }
        admin.require_auth();
        storage.set(&DataKey::Name, &name);
        storage.set(&DataKey::Symbol, &symbol);
        storage.set(&DataKey::BaseUri, &base_uri);
        storage.set(&DataKey::Supply, &0u32);

        let this = env.current_contract_address();
        add_role(&env, Role::DefaultAdmin, &admin, &this);
        add_role(&env, Role::Admin, &admin, &this);
        log!(&env, "registry initialized", admin);
    }

    fn is_zero_account(env: &Env, address: &Address) -> bool {
        let zero = Address::from_str(env, ZERO_ACCOUNT_STR);
        address == &zero
    }

    pub(crate) fn read_owner(env: &Env, label_id: &BytesN<32>) -> Option<Address> {
        env.storage()
            .persistent()
            .get(&DataKey::Owner(label_id.clone()))
    }

    pub fn name(env: Env) -> Bytes {
        read_bytes(&env, &DataKey::Name)
    }

    pub fn symbol(env: Env) -> Bytes {
        read_bytes(&env, &DataKey::Symbol)
    }

    pub fn base_uri(env: Env) -> Bytes {
        read_bytes(&env, &DataKey::BaseUri)
    }

    pub fn set_base_uri(env: Env, caller: Address, base_uri: Bytes) {
        ensure_initialized(&env);
        caller.require_auth();
        require_role(&env, Role::Admin, &caller);
        env.storage().persistent().set(&DataKey::BaseUri, &base_uri);
        EvtBaseUriChanged { base_uri }.publish(&env);
    }

    /// Metadata location for a registered label: base URI followed by the
    /// lowercase hex label id.
    pub fn token_uri(env: Env, label_id: BytesN<32>) -> Bytes {
        if Self::read_owner(&env, &label_id).is_none() {
            panic_with_error!(&env, RegistryError::NotRegistered);
        }
        let mut uri = read_bytes(&env, &DataKey::BaseUri);
        uri.append(&hex_encode(&env, &label_id));
        uri
    }

    pub fn total_supply(env: Env) -> u32 {
        read_supply(&env)
    }

    pub fn has_role(env: Env, role: Role, account: Address) -> bool {
        role_held(&env, role, &account)
    }

    pub fn grant_role(env: Env, caller: Address, role: Role, account: Address) {
        ensure_initialized(&env);
        caller.require_auth();
        require_role(&env, Role::DefaultAdmin, &caller);
        add_role(&env, role, &account, &caller);
    }

    pub fn revoke_role(env: Env, caller: Address, role: Role, account: Address) {
        ensure_initialized(&env);
        caller.require_auth();
        require_role(&env, Role::DefaultAdmin, &caller);
        drop_role(&env, role, &account, &caller);
    }

    pub fn renounce_role(env: Env, caller: Address, role: Role) {
        ensure_initialized(&env);
        caller.require_auth();
        drop_role(&env, role, &caller, &caller);
    }

    pub fn add_registrar(env: Env, caller: Address, registrar: Address) {
        ensure_initialized(&env);
        caller.require_auth();
        require_role(&env, Role::Admin, &caller);
        if add_role(&env, Role::Registrar, &registrar, &caller) {
            EvtRegistrarAdded { registrar }.publish(&env);
        }
    }

    pub fn remove_registrar(env: Env, caller: Address, registrar: Address) {
        ensure_initialized(&env);
        caller.require_auth();
        require_role(&env, Role::Admin, &caller);
        if drop_role(&env, Role::Registrar, &registrar, &caller) {
            EvtRegistrarRemoved { registrar }.publish(&env);
        }
    }

    pub fn label_id(env: Env, label: Bytes) -> BytesN<32> {
        hash_label(&env, &label)
    }

    pub fn available(env: Env, label_id: BytesN<32>) -> bool {
        Self::read_owner(&env, &label_id).is_none()
    }

    pub fn owner_of(env: Env, label_id: BytesN<32>) -> Address {
        Self::read_owner(&env, &label_id)
            .unwrap_or_else(|| panic_with_error!(&env, RegistryError::NotRegistered))
    }

    /// Records `owner` for `label`. Only accounts holding the registrar role
    /// may call this, and a label can be recorded once.
    pub fn register(env: Env, caller: Address, label: Bytes, owner: Address) -> BytesN<32> {
        ensure_initialized(&env);
        caller.require_auth();
        require_role(&env, Role::Registrar, &caller);
        if Self::is_zero_account(&env, &owner) {
            panic_with_error!(&env, RegistryError::InvalidOwner);
        }

        let label_id = hash_label(&env, &label);
        if Self::read_owner(&env, &label_id).is_some() {
            panic_with_error!(&env, RegistryError::AlreadyRegistered);
        }

        let supply = read_supply(&env)
            .checked_add(1)
            .unwrap_or_else(|| panic_with_error!(&env, RegistryError::SupplyExhausted));
        let storage = env.storage().persistent();
        storage.set(&DataKey::Owner(label_id.clone()), &owner);
        storage.set(&DataKey::Supply, &supply);

        EvtTransfer {
            label_id: label_id.clone(),
            from: env.current_contract_address(),
            to: owner.clone(),
        }
        .publish(&env);
        EvtLabelRegistered {
            label_id: label_id.clone(),
            label,
            owner: owner.clone(),
        }
        .publish(&env);
        log!(&env, "label registered", label_id, owner);

        label_id
    }
}
