pub mod error;
pub mod middleware;
pub mod notifications;
pub mod polls;
pub mod reactions;
pub mod routes;
pub mod state;
pub mod threads;

mod blocking;

#[cfg(test)]
mod test_support;
