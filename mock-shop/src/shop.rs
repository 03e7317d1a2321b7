use crate::types::{CoinHistory, InfoResponse, Item, Received, Sent};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

pub const STARTING_COINS: i64 = 1000;

/// Merch catalogue, price in coins.
pub const MERCH: &[(&str, i64)] = &[
    ("t-shirt", 80),
    ("cup", 20),
    ("book", 50),
    ("pen", 10),
    ("powerbank", 200),
    ("hoody", 300),
    ("umbrella", 200),
    ("socks", 10),
    ("wallet", 50),
    ("pink-hoody", 500),
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ShopError {
    #[error("{0}")]
    InvalidInput(&'static str),

    #[error("passwords does not match")]
    WrongPassword,

    #[error("user not found")]
    UnknownUser,

    #[error("not enough coins")]
    InsufficientFunds,
}

#[derive(Debug, Default)]
struct User {
    password: String,
    coins: i64,
    inventory: BTreeMap<String, u32>,
    history: CoinHistory,
}

/// One request as the shop saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: String,
}

/// Shared shop state. Cloning hands out another handle to the same shop.
#[derive(Clone, Default)]
pub struct AppState {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    users: RwLock<HashMap<String, User>>,
    tokens: RwLock<HashMap<String, String>>,
    fixed_token: RwLock<Option<String>>,
    journal: Mutex<Vec<RecordedRequest>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user up front, as if they had already logged in once.
    pub fn seed_user(&self, username: &str, password: &str) {
        write(&self.inner.users).insert(
            username.to_string(),
            User {
                password: password.to_string(),
                coins: STARTING_COINS,
                ..Default::default()
            },
        );
    }

    /// Issue `token` to every subsequent successful login instead of a random one.
    pub fn set_fixed_token(&self, token: &str) {
        *write(&self.inner.fixed_token) = Some(token.to_string());
    }

    /// Log in, creating the user with the starting balance on first sight.
    pub fn auth(&self, username: &str, password: &str) -> Result<String, ShopError> {
        if username.is_empty() || password.is_empty() {
            return Err(ShopError::InvalidInput("Invalid input data"));
        }

        {
            let mut users = write(&self.inner.users);
            match users.get(username) {
                Some(user) if user.password != password => return Err(ShopError::WrongPassword),
                Some(_) => {}
                None => {
                    users.insert(
                        username.to_string(),
                        User {
                            password: password.to_string(),
                            coins: STARTING_COINS,
                            ..Default::default()
                        },
                    );
                }
            }
        }

        let token = read(&self.inner.fixed_token)
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        write(&self.inner.tokens).insert(token.clone(), username.to_string());
        Ok(token)
    }

    /// Username a bearer token was issued to.
    pub fn username_for(&self, token: &str) -> Option<String> {
        if token.is_empty() {
            return None;
        }
        read(&self.inner.tokens).get(token).cloned()
    }

    pub fn info(&self, username: &str) -> Result<InfoResponse, ShopError> {
        let users = read(&self.inner.users);
        let user = users.get(username).ok_or(ShopError::UnknownUser)?;

        Ok(InfoResponse {
            coins: user.coins,
            inventory: user
                .inventory
                .iter()
                .map(|(kind, quantity)| Item {
                    kind: kind.clone(),
                    quantity: *quantity,
                })
                .collect(),
            coin_history: user.history.clone(),
        })
    }

    pub fn send_coin(&self, from: &str, to: &str, amount: i64) -> Result<(), ShopError> {
        if to.is_empty() || amount <= 0 {
            return Err(ShopError::InvalidInput("Invalid input data"));
        }
        if from == to {
            return Err(ShopError::InvalidInput("cannot send coins to yourself"));
        }

        let mut users = write(&self.inner.users);
        if !users.contains_key(to) {
            return Err(ShopError::UnknownUser);
        }

        let sender = users.get_mut(from).ok_or(ShopError::UnknownUser)?;
        if sender.coins < amount {
            return Err(ShopError::InsufficientFunds);
        }
        sender.coins -= amount;
        sender.history.sent.push(Sent {
            to_user: to.to_string(),
            amount,
        });

        if let Some(recipient) = users.get_mut(to) {
            recipient.coins += amount;
            recipient.history.received.push(Received {
                from_user: from.to_string(),
                amount,
            });
        }
        Ok(())
    }

    pub fn buy(&self, username: &str, item: &str) -> Result<(), ShopError> {
        let price = MERCH
            .iter()
            .find(|(name, _)| *name == item)
            .map(|(_, price)| *price)
            .ok_or(ShopError::InvalidInput("unknown item"))?;

        let mut users = write(&self.inner.users);
        let user = users.get_mut(username).ok_or(ShopError::UnknownUser)?;
        if user.coins < price {
            return Err(ShopError::InsufficientFunds);
        }
        user.coins -= price;
        *user.inventory.entry(item.to_string()).or_default() += 1;
        Ok(())
    }

    pub fn balance(&self, username: &str) -> Option<i64> {
        read(&self.inner.users).get(username).map(|u| u.coins)
    }

    pub(crate) fn record(&self, request: RecordedRequest) {
        self.inner
            .journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner
            .journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests received for `method` and `path`.
    pub fn count(&self, method: &str, path: &str) -> usize {
        self.inner
            .journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
