//! Two-Party Escrow Contract
//!
//! A neutral custodian for a deal between two counterparties. The creator
//! (the initiator) agrees a value, names the other party, and then each
//! party deposits its share in the configured token. The contract moves
//! through three stages and never goes back:
//!
//! `ValueSetting` -> `AddingAnotherParty` -> `Payment`
//!
//! Every state change publishes a typed event; every rejected call returns
//! an [`EscrowError`] and the host reverts the invocation.
//!
//! There is no release or refund path. Funds deposited here stay held.

#![no_std]

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, log, panic_with_error, symbol_short,
    token, Address, Env, Symbol,
};

/// Number of `value` units each deposit must carry.
pub const DEPOSIT_MULTIPLIER: i128 = 2;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Reasons an escrow call is rejected. Every rejection reverts the whole
/// invocation, so storage and token balances are left untouched.
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum EscrowError {
    // Caller identity
    NotInitiator = 1,

    // Stage gating
    WrongStage = 2,

    // Deposits
    NotParty = 3,
    AmountMismatch = 4,

    // Arguments
    InvalidAmount = 5,
    InvalidParty = 6,

    AlreadyPaid = 7,
    Overflow = 8,

    /// Storage read before the constructor ran. Unreachable on a deployed
    /// instance since construction is part of deployment.
    NotInitialized = 9,
}

/// Phase of the escrow. Only ever moves forward, one step at a time.
#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum Stage {
    ValueSetting = 0,
    AddingAnotherParty = 1,
    Payment = 2,
}

impl Stage {
    /// The stage a successful transition out of `self` lands in.
    /// `Payment` is terminal.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::ValueSetting => Some(Stage::AddingAnotherParty),
            Stage::AddingAnotherParty => Some(Stage::Payment),
            Stage::Payment => None,
        }
    }
}

/// Published once, by the constructor.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Deployed {
    pub initiator: Address,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValueChange {
    pub old_value: i128,
    pub new_value: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OtherPartySet {
    pub other_party: Address,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Deposit {
    pub depositor: Address,
    pub amount: i128,
}

// ---------------------------------------------------------------------------
// Event Symbols
// ---------------------------------------------------------------------------

pub const EVT_DEPLOYED: Symbol = symbol_short!("deployed");
pub const EVT_VALUE_CHANGE: Symbol = symbol_short!("val_chg");
pub const EVT_OTHER_PARTY_SET: Symbol = symbol_short!("oth_set");
pub const EVT_DEPOSIT: Symbol = symbol_short!("deposit");

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

const KEY_STAGE: Symbol = symbol_short!("stage");
const KEY_INITIATOR: Symbol = symbol_short!("init");
const KEY_OTHER_PARTY: Symbol = symbol_short!("other");
const KEY_VALUE: Symbol = symbol_short!("value");
const KEY_BALANCE: Symbol = symbol_short!("balance");
const KEY_TOKEN: Symbol = symbol_short!("token");
const KEY_PAID: Symbol = symbol_short!("paid");

// Stage, initiator and token are written by the constructor, so a missing
// entry means the instance was never constructed.

fn read_stage(env: &Env) -> Stage {
    env.storage()
        .instance()
        .get(&KEY_STAGE)
        .unwrap_or_else(|| panic_with_error!(env, EscrowError::NotInitialized))
}

fn write_stage(env: &Env, stage: Stage) {
    env.storage().instance().set(&KEY_STAGE, &stage);
}

fn read_initiator(env: &Env) -> Address {
    env.storage()
        .instance()
        .get(&KEY_INITIATOR)
        .unwrap_or_else(|| panic_with_error!(env, EscrowError::NotInitialized))
}

fn read_token(env: &Env) -> Address {
    env.storage()
        .instance()
        .get(&KEY_TOKEN)
        .unwrap_or_else(|| panic_with_error!(env, EscrowError::NotInitialized))
}

fn read_other_party(env: &Env) -> Option<Address> {
    env.storage().instance().get(&KEY_OTHER_PARTY)
}

fn read_value(env: &Env) -> i128 {
    env.storage().instance().get(&KEY_VALUE).unwrap_or(0)
}

fn read_balance(env: &Env) -> i128 {
    env.storage().instance().get(&KEY_BALANCE).unwrap_or(0)
}

// Paid flags are per-account persistent entries keyed `(paid, Address)`.

fn read_paid(env: &Env, account: &Address) -> bool {
    env.storage()
        .persistent()
        .get(&(KEY_PAID, account.clone()))
        .unwrap_or(false)
}

fn write_paid(env: &Env, account: &Address) {
    env.storage()
        .persistent()
        .set(&(KEY_PAID, account.clone()), &true);
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct TwoPartyEscrow;

#[contractimpl]
impl TwoPartyEscrow {
    /// Runs once, as part of deployment. The initiator must sign the
    /// deployment, so nobody can open an escrow in someone else's name.
    ///
    /// # Arguments
    /// * `initiator` - Creator of the escrow; the only account that may set
    ///   the value and the other party
    /// * `token` - Token contract deposits are made in
    pub fn __constructor(env: Env, initiator: Address, token: Address) {
        initiator.require_auth();

        write_stage(&env, Stage::ValueSetting);
        env.storage().instance().set(&KEY_INITIATOR, &initiator);
        env.storage().instance().set(&KEY_TOKEN, &token);
        env.storage().instance().set(&KEY_VALUE, &0i128);
        env.storage().instance().set(&KEY_BALANCE, &0i128);

        log!(&env, "escrow deployed", initiator, token);

        env.events().publish((EVT_DEPLOYED,), Deployed { initiator });
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Agree the per-party value and move to `AddingAnotherParty`.
    pub fn set_value(env: Env, caller: Address, amount: i128) -> Result<(), EscrowError> {
        caller.require_auth();

        Self::require_initiator(&env, &caller)?;
        Self::require_stage(&env, Stage::ValueSetting)?;

        if amount < 0 {
            return Err(EscrowError::InvalidAmount);
        }

        let old_value = read_value(&env);
        env.storage().instance().set(&KEY_VALUE, &amount);
        Self::advance(&env, Stage::ValueSetting);

        log!(&env, "value changed", old_value, amount);

        env.events().publish(
            (EVT_VALUE_CHANGE,),
            ValueChange {
                old_value,
                new_value: amount,
            },
        );

        Ok(())
    }

    /// Name the second counterparty and open the escrow for deposits.
    pub fn set_other_party(env: Env, caller: Address, account: Address) -> Result<(), EscrowError> {
        caller.require_auth();

        let initiator = Self::require_initiator(&env, &caller)?;
        Self::require_stage(&env, Stage::AddingAnotherParty)?;

        if account == initiator {
            return Err(EscrowError::InvalidParty);
        }

        env.storage().instance().set(&KEY_OTHER_PARTY, &account);
        Self::advance(&env, Stage::AddingAnotherParty);

        log!(&env, "other party set", account);

        env.events().publish(
            (EVT_OTHER_PARTY_SET,),
            OtherPartySet {
                other_party: account,
            },
        );

        Ok(())
    }

    /// Deposit a party's contribution.
    ///
    /// `amount` must be exactly `value * DEPOSIT_MULTIPLIER`. Each party
    /// therefore locks twice the agreed value, and a fully funded escrow
    /// holds four times it. Whether the agreement intended `value` per party
    /// is not known; the doubled amount is kept as the deployed behaviour.
    pub fn deposit(env: Env, from: Address, amount: i128) -> Result<(), EscrowError> {
        from.require_auth();

        Self::require_stage(&env, Stage::Payment)?;

        let initiator = read_initiator(&env);
        let is_party = from == initiator || read_other_party(&env).as_ref() == Some(&from);
        if !is_party {
            log!(&env, "deposit rejected: not a party", from);
            return Err(EscrowError::NotParty);
        }

        let required = read_value(&env)
            .checked_mul(DEPOSIT_MULTIPLIER)
            .ok_or(EscrowError::Overflow)?;
        if amount != required {
            log!(&env, "deposit rejected: amount mismatch", amount, required);
            return Err(EscrowError::AmountMismatch);
        }

        if read_paid(&env, &from) {
            return Err(EscrowError::AlreadyPaid);
        }

        let balance = read_balance(&env)
            .checked_add(amount)
            .ok_or(EscrowError::Overflow)?;
        env.storage().instance().set(&KEY_BALANCE, &balance);
        write_paid(&env, &from);

        let token_client = token::Client::new(&env, &read_token(&env));
        token_client.transfer(&from, &env.current_contract_address(), &amount);

        log!(&env, "deposit accepted", from, amount, balance);

        env.events().publish(
            (EVT_DEPOSIT,),
            Deposit {
                depositor: from,
                amount,
            },
        );

        Ok(())
    }

    // ========================================================================
    // Observers
    // ========================================================================

    pub fn current_stage(env: Env) -> Stage {
        read_stage(&env)
    }

    pub fn initiator(env: Env) -> Address {
        read_initiator(&env)
    }

    /// `None` until `set_other_party` succeeds.
    pub fn other_party(env: Env) -> Option<Address> {
        read_other_party(&env)
    }

    pub fn value(env: Env) -> i128 {
        read_value(&env)
    }

    /// Sum of all accepted deposits.
    pub fn balance(env: Env) -> i128 {
        read_balance(&env)
    }

    pub fn paid(env: Env, account: Address) -> bool {
        read_paid(&env, &account)
    }

    pub fn token(env: Env) -> Address {
        read_token(&env)
    }

    /// True once both the initiator and the other party have deposited.
    pub fn both_paid(env: Env) -> bool {
        match read_other_party(&env) {
            Some(other) => read_paid(&env, &read_initiator(&env)) && read_paid(&env, &other),
            None => false,
        }
    }

    // ========================================================================
    // Guards
    // ========================================================================

    fn require_initiator(env: &Env, caller: &Address) -> Result<Address, EscrowError> {
        let initiator = read_initiator(env);
        if *caller != initiator {
            log!(env, "rejected: caller is not the initiator", caller.clone());
            return Err(EscrowError::NotInitiator);
        }
        Ok(initiator)
    }

    fn require_stage(env: &Env, expected: Stage) -> Result<(), EscrowError> {
        let stage = read_stage(env);
        if stage != expected {
            log!(env, "rejected: wrong stage", stage as u32, expected as u32);
            return Err(EscrowError::WrongStage);
        }
        Ok(())
    }

    /// Move one step forward from `from`. Callers have already checked that
    /// the current stage is `from`.
    fn advance(env: &Env, from: Stage) {
        if let Some(next) = from.next() {
            write_stage(env, next);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
