//! Dispatch table: command kind to handler

use crate::CacheError;
use crate::config::StoreConfig;
use crate::protocol::Command;
use crate::scheduler::job::{Outcome, Reply, Request};
use crate::storage::CacheStore;

/// Version string answered by `stat`
pub const VERSION: &str = concat!("jeapcached ", env!("CARGO_PKG_VERSION"));

/// A command handler. Store handlers take the request's value.
pub type Handler = Box<dyn Fn(&CacheStore, &mut Request) -> Outcome + Send + Sync>;

/// Fixed mapping from command kind to handler
pub struct DispatchTable {
    handlers: [Option<Handler>; Command::COUNT],
}

impl DispatchTable {
    /// A table with nothing registered
    pub fn empty() -> Self {
        Self {
            handlers: std::array::from_fn(|_| None),
        }
    }

    /// The standard handler set for `config`
    pub fn new(config: &StoreConfig) -> Self {
        let mut table = Self::empty();
        table.register(Command::Set, Box::new(handle_set));
        table.register(Command::Add, Box::new(handle_add));
        table.register(Command::Replace, Box::new(handle_replace));
        table.register(Command::Append, Box::new(handle_append));
        table.register(Command::Prepend, Box::new(handle_prepend));
        table.register(Command::Cas, Box::new(handle_cas));
        table.register(Command::Get, Box::new(handle_get));
        table.register(Command::Gets, Box::new(handle_get));
        table.register(Command::Delete, Box::new(handle_delete));
        table.register(Command::Stat, Box::new(handle_stat));

        if config.arithmetic {
            table.register(Command::Incr, Box::new(handle_incr));
            table.register(Command::Decr, Box::new(handle_decr));
        }

        if config.backdoor {
            table.register(Command::ZeroOps, Box::new(handle_backdoor));
        } else {
            table.register(Command::ZeroOps, Box::new(handle_no_backdoor));
        }

        table
    }

    /// Install `handler` for `command`, replacing any previous one
    pub fn register(&mut self, command: Command, handler: Handler) {
        self.handlers[command.index()] = Some(handler);
    }

    pub fn unregister(&mut self, command: Command) {
        self.handlers[command.index()] = None;
    }

    pub fn is_registered(&self, command: Command) -> bool {
        self.handlers[command.index()].is_some()
    }

    /// Run the handler for the request's command
    pub fn dispatch(&self, store: &CacheStore, request: &mut Request) -> Outcome {
        match &self.handlers[request.command.index()] {
            Some(handler) => handler(store, request),
            None => Err(CacheError::NotImplement),
        }
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

fn key(request: &Request) -> Result<&[u8], CacheError> {
    request.key.as_deref().ok_or(CacheError::NotStored)
}

fn handle_set(store: &CacheStore, request: &mut Request) -> Outcome {
    let key = request.key.clone().ok_or(CacheError::NotStored)?;
    let value = request.value.take().ok_or(CacheError::NotStored)?;
    store.set(key, value, request.flags, request.exptime)?;
    Ok(Reply::Stored)
}

fn handle_add(store: &CacheStore, request: &mut Request) -> Outcome {
    let key = request.key.clone().ok_or(CacheError::NotStored)?;
    let value = request.value.take().ok_or(CacheError::NotStored)?;
    store.add(key, value, request.flags, request.exptime)?;
    Ok(Reply::Stored)
}

fn handle_replace(store: &CacheStore, request: &mut Request) -> Outcome {
    let value = request.value.take().ok_or(CacheError::NotStored)?;
    store.replace(key(request)?, value)?;
    Ok(Reply::Stored)
}

fn handle_append(store: &CacheStore, request: &mut Request) -> Outcome {
    let suffix = request.value.take().ok_or(CacheError::NotStored)?;
    store.append(key(request)?, &suffix)?;
    Ok(Reply::Stored)
}

fn handle_prepend(store: &CacheStore, request: &mut Request) -> Outcome {
    let prefix = request.value.take().ok_or(CacheError::NotStored)?;
    store.prepend(key(request)?, &prefix)?;
    Ok(Reply::Stored)
}

fn handle_cas(store: &CacheStore, request: &mut Request) -> Outcome {
    let value = request.value.take().ok_or(CacheError::NotStored)?;
    store.cas(
        key(request)?,
        value,
        request.flags,
        request.exptime,
        request.cas,
    )?;
    Ok(Reply::Stored)
}

fn handle_get(store: &CacheStore, request: &mut Request) -> Outcome {
    store.get(key(request)?).map(Reply::Value)
}

fn handle_delete(store: &CacheStore, request: &mut Request) -> Outcome {
    store.delete(key(request)?, request.exptime)?;
    Ok(Reply::Deleted)
}

fn handle_incr(store: &CacheStore, request: &mut Request) -> Outcome {
    store.incr(key(request)?, request.delta).map(Reply::Number)
}

fn handle_decr(store: &CacheStore, request: &mut Request) -> Outcome {
    store.decr(key(request)?, request.delta).map(Reply::Number)
}

fn handle_stat(_store: &CacheStore, _request: &mut Request) -> Outcome {
    Ok(Reply::Message(VERSION.to_string()))
}

fn handle_no_backdoor(_store: &CacheStore, _request: &mut Request) -> Outcome {
    Err(CacheError::NoBackdoor)
}

fn handle_backdoor(store: &CacheStore, _request: &mut Request) -> Outcome {
    let stats = store.stats();
    Ok(Reply::Message(format!(
        "buckets {} items {} purged {}",
        store.buckets(),
        stats.items,
        stats.purged
    )))
}
