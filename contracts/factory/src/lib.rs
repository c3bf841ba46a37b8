#![no_std]

#[cfg(test)]
extern crate std;

use soroban_sdk::xdr::ToXdr;
use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, log, panic_with_error,
    Address, Bytes, BytesN, Env,
};

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum FactoryError {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    UnknownRegistry = 3,
    NonceExhausted = 4,
}

#[derive(Clone)]
#[contracttype]
enum DataKey {
    Implementation,
    Nonce,
    Deployed(u32),
}

#[derive(Clone)]
#[contractevent(topics = ["registry_deployed"])]
pub struct EvtRegistryDeployed {
    #[topic]
    pub registry: Address,
    pub admin: Address,
    pub name: Bytes,
}

fn read_implementation(env: &Env) -> BytesN<32> {
    env.storage()
        .persistent()
        .get(&DataKey::Implementation)
        .unwrap_or_else(|| panic_with_error!(env, FactoryError::NotInitialized))
}

fn read_nonce(env: &Env) -> u32 {
    env.storage().persistent().get(&DataKey::Nonce).unwrap_or(0)
}

/// Salt for the `nonce`-th deployment requested by `caller`. The nonce is
/// global, so no two deployments ever share a salt.
fn registry_salt(env: &Env, caller: &Address, nonce: u32) -> BytesN<32> {
    let mut data = caller.clone().to_xdr(env);
    data.extend_from_array(&nonce.to_be_bytes());
    env.crypto().sha256(&data).to_bytes()
}

mod registry_api {
    use super::*;
    use soroban_sdk::{IntoVal, Symbol};

    pub fn init(
        env: &Env,
        registry: &Address,
        name: &Bytes,
        symbol: &Bytes,
        base_uri: &Bytes,
        admin: &Address,
    ) {
        env.invoke_contract::<()>(
            registry,
            &Symbol::new(env, "init"),
            (name.clone(), symbol.clone(), base_uri.clone(), admin.clone()).into_val(env),
        );
    }
}

/// Deploys independent registry instances from one uploaded registry wasm.
#[contract]
pub struct RegistryFactory;

#[contractimpl]
impl RegistryFactory {
    pub fn version(_env: Env) -> u32 {
        1
    }

    /// One-time initializer. `implementation` is the hash of the uploaded
    /// registry wasm every deployment runs.
    pub fn init(env: Env, implementation: BytesN<32>) {
        let storage = env.storage().persistent();
        if storage.has(&DataKey::Implementation) {
            panic_with_error!(&env, FactoryError::AlreadyInitialized);
        }
        storage.set(&DataKey::Implementation, &implementation);
        storage.set(&DataKey::Nonce, &0u32);
    }

    pub fn implementation(env: Env) -> BytesN<32> {
        read_implementation(&env)
    }

    pub fn registry_count(env: Env) -> u32 {
        read_nonce(&env)
    }

    pub fn registry_at(env: Env, index: u32) -> Address {
        env.storage()
            .persistent()
            .get(&DataKey::Deployed(index))
            .unwrap_or_else(|| panic_with_error!(&env, FactoryError::UnknownRegistry))
    }

    /// Address the next `deploy_registry` call from `caller` will produce.
    pub fn next_registry_address(env: Env, caller: Address) -> Address {
        let salt = registry_salt(&env, &caller, read_nonce(&env));
        env.deployer().with_current_contract(salt).deployed_address()
    }

    /// Deploy and initialize a new registry administered by `caller`.
    pub fn deploy_registry(
        env: Env,
        caller: Address,
        name: Bytes,
        symbol: Bytes,
        base_uri: Bytes,
    ) -> Address {
        caller.require_auth();
        let implementation = read_implementation(&env);

        let nonce = read_nonce(&env);
        let next = nonce
            .checked_add(1)
            .unwrap_or_else(|| panic_with_error!(&env, FactoryError::NonceExhausted));
        let salt = registry_salt(&env, &caller, nonce);
        let registry = env
            .deployer()
            .with_current_contract(salt)
            .deploy_v2(implementation, ());

        // Roles are granted to `caller` only; the factory keeps none.
        registry_api::init(&env, &registry, &name, &symbol, &base_uri, &caller);

        let storage = env.storage().persistent();
        storage.set(&DataKey::Deployed(nonce), &registry);
        storage.set(&DataKey::Nonce, &next);

        EvtRegistryDeployed {
            registry: registry.clone(),
            admin: caller,
            name,
        }
        .publish(&env);
        log!(&env, "registry deployed", registry, nonce);

        registry
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use registry::{RegistryClient, Role};
    use soroban_sdk::{
        testutils::{Address as _, Events},
        Address, Bytes, BytesN, Env, Symbol, TryFromVal,
    };

    const REGISTRY_WASM_PATH: &str = "../../target/wasm32v1-none/release/registry.wasm";

    fn setup_env() -> (Env, Address, RegistryFactoryClient<'static>) {
        let env = Env::default();
        env.mock_all_auths();
        let factory_id = env.register(RegistryFactory, ());
        let client = RegistryFactoryClient::new(&env, &factory_id);
        (env, factory_id, client)
    }

    fn make_bytes(env: &Env, text: &str) -> Bytes {
        Bytes::from_slice(env, text.as_bytes())
    }

    #[test]
    fn init_records_implementation() {
        let (env, _id, client) = setup_env();
        let implementation = BytesN::from_array(&env, &[7u8; 32]);
        client.init(&implementation);

        assert_eq!(client.implementation(), implementation);
        assert_eq!(client.registry_count(), 0);
        assert_eq!(client.version(), 1);
    }

    #[test]
    fn init_only_once() {
        let (env, _id, client) = setup_env();
        client.init(&BytesN::from_array(&env, &[1u8; 32]));

        let result = client.try_init(&BytesN::from_array(&env, &[2u8; 32]));
        assert_eq!(
            result.unwrap_err(),
            Ok(FactoryError::AlreadyInitialized.into())
        );
        assert_eq!(client.implementation(), BytesN::from_array(&env, &[1u8; 32]));
    }

    #[test]
    fn deploy_requires_init() {
        let (env, _id, client) = setup_env();
        let caller = Address::generate(&env);

        let result = client.try_deploy_registry(
            &caller,
            &make_bytes(&env, "Names"),
            &make_bytes(&env, "NAME"),
            &make_bytes(&env, "https://names.example/"),
        );
        assert_eq!(result.unwrap_err(), Ok(FactoryError::NotInitialized.into()));
        let implementation = client.try_implementation();
        assert_eq!(
            implementation.unwrap_err(),
            Ok(FactoryError::NotInitialized.into())
        );
    }

    #[test]
    fn deploy_fails_once_nonce_is_exhausted() {
        let (env, factory_id, client) = setup_env();
        client.init(&BytesN::from_array(&env, &[1u8; 32]));
        env.as_contract(&factory_id, || {
            env.storage().persistent().set(&DataKey::Nonce, &u32::MAX);
        });
        let caller = Address::generate(&env);

        let result = client.try_deploy_registry(
            &caller,
            &make_bytes(&env, "Names"),
            &make_bytes(&env, "NAME"),
            &make_bytes(&env, "https://names.example/"),
        );
        assert_eq!(result.unwrap_err(), Ok(FactoryError::NonceExhausted.into()));
        assert_eq!(client.registry_count(), u32::MAX);
    }

    #[test]
    fn unknown_registry_index_fails() {
        let (env, _id, client) = setup_env();
        client.init(&BytesN::from_array(&env, &[1u8; 32]));
        let result = client.try_registry_at(&0);
        assert_eq!(result.unwrap_err(), Ok(FactoryError::UnknownRegistry.into()));
    }

    #[test]
    fn next_address_is_deterministic_and_caller_specific() {
        let (env, _id, client) = setup_env();
        client.init(&BytesN::from_array(&env, &[1u8; 32]));
        let alice = Address::generate(&env);
        let bob = Address::generate(&env);

        let first = client.next_registry_address(&alice);
        assert_eq!(client.next_registry_address(&alice), first);
        assert_ne!(client.next_registry_address(&bob), first);
    }

    #[test]
    fn salts_differ_per_nonce() {
        let env = Env::default();
        let caller = Address::generate(&env);
        let other = Address::generate(&env);
        let first = registry_salt(&env, &caller, 0);
        assert_eq!(registry_salt(&env, &caller, 0), first);
        assert_ne!(registry_salt(&env, &caller, 1), first);
        assert_ne!(registry_salt(&env, &other, 0), first);
    }

    #[test]
    #[ignore = "needs the registry wasm from `stellar contract build`"]
    fn deployed_registries_are_independent() {
        let (env, factory_id, client) = setup_env();
        let wasm = std::fs::read(REGISTRY_WASM_PATH).unwrap();
        let wasm_hash = env.deployer().upload_contract_wasm(wasm.as_slice());
        client.init(&wasm_hash);

        let admin_a = Address::generate(&env);
        let admin_b = Address::generate(&env);

        let predicted = client.next_registry_address(&admin_a);
        let registry_a = client.deploy_registry(
            &admin_a,
            &make_bytes(&env, "Alpha Names"),
            &make_bytes(&env, "ALPHA"),
            &make_bytes(&env, "https://alpha.example/"),
        );
        assert_eq!(registry_a, predicted);

        let events = env.events().all();
        let mut found = false;
        for idx in 0..events.len() {
            let (contract_id, topics, _data) = events.get(idx).unwrap();
            if contract_id != factory_id {
                continue;
            }
            let symbol = Symbol::try_from_val(&env, &topics.get(0).unwrap()).unwrap();
            if symbol == Symbol::new(&env, "registry_deployed") {
                let topic_registry =
                    Address::try_from_val(&env, &topics.get(1).unwrap()).unwrap();
                assert_eq!(topic_registry, registry_a);
                found = true;
            }
        }
        assert!(found, "expected registry_deployed event");

        let registry_b = client.deploy_registry(
            &admin_b,
            &make_bytes(&env, "Beta Names"),
            &make_bytes(&env, "BETA"),
            &make_bytes(&env, "https://beta.example/"),
        );
        assert_ne!(registry_a, registry_b);
        assert_eq!(client.registry_count(), 2);
        assert_eq!(client.registry_at(&0), registry_a);
        assert_eq!(client.registry_at(&1), registry_b);

        let a = RegistryClient::new(&env, &registry_a);
        let b = RegistryClient::new(&env, &registry_b);
        assert_eq!(a.name(), make_bytes(&env, "Alpha Names"));
        assert_eq!(b.symbol(), make_bytes(&env, "BETA"));

        for (registry, admin) in [(&a, &admin_a), (&b, &admin_b)] {
            assert!(registry.has_role(&Role::DefaultAdmin, admin));
            assert!(registry.has_role(&Role::Admin, admin));
            assert!(!registry.has_role(&Role::DefaultAdmin, &factory_id));
            assert!(!registry.has_role(&Role::Admin, &factory_id));
            assert!(!registry.has_role(&Role::Registrar, &factory_id));
        }
        assert!(!a.has_role(&Role::Admin, &admin_b));
        assert!(!b.has_role(&Role::Admin, &admin_a));

        let registrar = Address::generate(&env);
        a.add_registrar(&admin_a, &registrar);
        let owner = Address::generate(&env);
        let label_id = a.register(&registrar, &make_bytes(&env, "test"), &owner);

        assert!(!a.available(&label_id));
        assert!(b.available(&label_id));
        assert!(!b.has_role(&Role::Registrar, &registrar));
    }
}
