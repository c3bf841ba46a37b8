#![no_std]

#[cfg(test)]
extern crate std;

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, log, panic_with_error,
    token, Address, Bytes, BytesN, Env,
};

const MAX_LABEL_LENGTH: u32 = 63;

fn default_params() -> RegistrarParams {
    RegistrarParams {
        min_label_len: 1,
        max_label_len: MAX_LABEL_LENGTH,
    }
}

fn read_registry(env: &Env) -> Address {
    env.storage()
        .persistent()
        .get(&DataKey::Registry)
        .unwrap_or_else(|| panic_with_error!(env, RegistrarError::NotInitialized))
}

fn read_token(env: &Env) -> Address {
    env.storage()
        .persistent()
        .get(&DataKey::PaymentToken)
        .unwrap_or_else(|| panic_with_error!(env, RegistrarError::NotInitialized))
}

fn read_price(env: &Env) -> i128 {
    env.storage()
        .persistent()
        .get(&DataKey::Price)
        .unwrap_or_else(|| panic_with_error!(env, RegistrarError::NotInitialized))
}

fn read_params(env: &Env) -> RegistrarParams {
    env.storage()
        .persistent()
        .get(&DataKey::Params)
        .unwrap_or_else(|| panic_with_error!(env, RegistrarError::NotInitialized))
}

fn write_price(env: &Env, price: i128) {
    env.storage().persistent().set(&DataKey::Price, &price);
}

fn write_params(env: &Env, params: &RegistrarParams) {
    env.storage().persistent().set(&DataKey::Params, params);
}

fn ensure_initialized(env: &Env) {
    if !env.storage().persistent().has(&DataKey::Registry) {
        panic_with_error!(env, RegistrarError::NotInitialized);
    }
}

/// Registrar administration follows the registry: whoever holds the
/// registry's admin role may price and drain this registrar.
fn ensure_admin(env: &Env, caller: &Address) {
    let registry = read_registry(env);
    if !registry_api::has_role(env, &registry, Role::Admin, caller) {
        panic_with_error!(env, RegistrarError::AccessDenied);
    }
}

fn validate_label(env: &Env, label: &Bytes) {
    let params = read_params(env);
    let len = label.len();
    if len < params.min_label_len || len > params.max_label_len {
        panic_with_error!(env, RegistrarError::InvalidLabel);
    }
    let last_idx = (len - 1) as usize;
    for (idx, b) in label.iter().enumerate() {
        match b {
            b'a'..=b'z' | b'0'..=b'9' => {}
            b'-' if idx != 0 && idx != last_idx => {}
            _ => panic_with_error!(env, RegistrarError::InvalidLabel),
        };
    }
}

fn compute_label_id(env: &Env, label: &Bytes) -> BytesN<32> {
    env.crypto().sha256(label).to_bytes()
}

fn token_client(env: &Env) -> token::Client<'_> {
    token::Client::new(env, &read_token(env))
}

mod registry_api {
    use super::*;
    use soroban_sdk::{IntoVal, Symbol};

    pub fn has_role(env: &Env, registry: &Address, role: Role, account: &Address) -> bool {
        env.invoke_contract::<bool>(
            registry,
            &Symbol::new(env, "has_role"),
            (role, account.clone()).into_val(env),
        )
    }

    pub fn available(env: &Env, registry: &Address, label_id: &BytesN<32>) -> bool {
        env.invoke_contract::<bool>(
            registry,
            &Symbol::new(env, "available"),
            (label_id.clone(),).into_val(env),
        )
    }

    pub fn register(env: &Env, registry: &Address, label: &Bytes, owner: &Address) -> BytesN<32> {
        let registrar = env.current_contract_address();
        env.invoke_contract::<BytesN<32>>(
            registry,
            &Symbol::new(env, "register"),
            (registrar, label.clone(), owner.clone()).into_val(env),
        )
    }
}

/// Role identifiers understood by the registry contract.
#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    DefaultAdmin,
    Admin,
    Registrar,
}

/// Fixed-price sales front for a registry.
#[contract]
pub struct Registrar;

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegistrarParams {
    pub min_label_len: u32,
    pub max_label_len: u32,
}

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum RegistrarError {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    AccessDenied = 3,
    AlreadyRegistered = 4,
    InsufficientPayment = 5,
    InsufficientBalance = 6,
    InvalidLabel = 7,
    InvalidAmount = 8,
    InvalidParams = 9,
}

#[derive(Clone)]
#[contracttype]
enum DataKey {
    Registry,
    PaymentToken,
    Price,
    Params,
}

#[derive(Clone)]
#[contractevent(topics = ["price_updated"])]
pub struct EvtPriceUpdated {
    pub old_price: i128,
    pub new_price: i128,
}

#[derive(Clone)]
#[contractevent(topics = ["name_registered"])]
pub struct EvtNameRegistered {
    #[topic]
    pub label_id: BytesN<32>,
    pub label: Bytes,
    pub owner: Address,
    pub price: i128,
}

#[derive(Clone)]
#[contractevent(topics = ["address_withdrew"])]
pub struct EvtAddressWithdrew {
    #[topic]
    pub recipient: Address,
    pub amount: i128,
}

#[contractimpl]
impl Registrar {
    pub fn version(_env: Env) -> u32 {
        1
    }

    /// One-time initializer. The price starts at zero.
    pub fn init(env: Env, registry: Address, payment_token: Address) {
        let storage = env.storage().persistent();
        if storage.has(&DataKey::Registry) {
            panic_with_error!(&env, RegistrarError::AlreadyInitialized);
        }
        storage.set(&DataKey::Registry, &registry);
        storage.set(&DataKey::PaymentToken, &payment_token);
        write_price(&env, 0);
        write_params(&env, &default_params());
    }

    pub fn registry(env: Env) -> Address {
        read_registry(&env)
    }

    pub fn payment_token(env: Env) -> Address {
        read_token(&env)
    }

    /// Current price of one registration, in payment token units.
    pub fn price(env: Env) -> i128 {
        read_price(&env)
    }

    pub fn params(env: Env) -> RegistrarParams {
        read_params(&env)
    }

    /// Funds collected so far and not yet withdrawn.
    pub fn balance(env: Env) -> i128 {
        ensure_initialized(&env);
        token_client(&env).balance(&env.current_contract_address())
    }

    /// Id of `label`, accepting exactly the labels `register` would sell.
    pub fn label_id(env: Env, label: Bytes) -> BytesN<32> {
        validate_label(&env, &label);
        compute_label_id(&env, &label)
    }

    pub fn available(env: Env, label_id: BytesN<32>) -> bool {
        let registry = read_registry(&env);
        registry_api::available(&env, &registry, &label_id)
    }

    /// Sell `label` to `owner`. `payment` is pulled from `caller`, anything
    /// above the current price goes straight back to `caller`.
    pub fn register(
        env: Env,
        caller: Address,
        label: Bytes,
        owner: Address,
        payment: i128,
    ) -> BytesN<32> {
        ensure_initialized(&env);
        caller.require_auth();
        validate_label(&env, &label);

        let registry = read_registry(&env);
        let label_id = compute_label_id(&env, &label);
        if !registry_api::available(&env, &registry, &label_id) {
            panic_with_error!(&env, RegistrarError::AlreadyRegistered);
        }

        let price = read_price(&env);
        if payment < 0 {
            panic_with_error!(&env, RegistrarError::InvalidAmount);
        }
        if payment < price {
            panic_with_error!(&env, RegistrarError::InsufficientPayment);
        }

        registry_api::register(&env, &registry, &label, &owner);

        let this = env.current_contract_address();
        let token = token_client(&env);
        if payment > 0 {
            token.transfer(&caller, &this, &payment);
        }
        let refund = payment - price;
        if refund > 0 {
            token.transfer(&this, &caller, &refund);
        }

        EvtNameRegistered {
            label_id: label_id.clone(),
            label,
            owner,
            price,
        }
        .publish(&env);
        log!(&env, "name sold", label_id, price, refund);

        label_id
    }

    pub fn set_price(env: Env, caller: Address, new_price: i128) {
        ensure_initialized(&env);
        caller.require_auth();
        ensure_admin(&env, &caller);
        if new_price < 0 {
            panic_with_error!(&env, RegistrarError::InvalidAmount);
        }
        let old_price = read_price(&env);
        write_price(&env, new_price);
        EvtPriceUpdated {
            old_price,
            new_price,
        }
        .publish(&env);
    }

    pub fn set_params(env: Env, caller: Address, params: RegistrarParams) {
        ensure_initialized(&env);
        caller.require_auth();
        ensure_admin(&env, &caller);
        if params.min_label_len == 0
            || params.min_label_len > params.max_label_len
            || params.max_label_len > MAX_LABEL_LENGTH
        {
            panic_with_error!(&env, RegistrarError::InvalidParams);
        }
        write_params(&env, &params);
    }

    /// Send `amount` of the collected funds to the calling admin.
    pub fn withdraw(env: Env, caller: Address, amount: i128) {
        ensure_initialized(&env);
        caller.require_auth();
        ensure_admin(&env, &caller);
        if amount <= 0 {
            panic_with_error!(&env, RegistrarError::InvalidAmount);
        }

        let this = env.current_contract_address();
        let token = token_client(&env);
        if amount > token.balance(&this) {
            panic_with_error!(&env, RegistrarError::InsufficientBalance);
        }
        token.transfer(&this, &caller, &amount);

        EvtAddressWithdrew {
            recipient: caller.clone(),
            amount,
        }
        .publish(&env);
        log!(&env, "funds withdrawn", caller, amount);
    }
}
