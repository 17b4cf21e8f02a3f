//! Cross-crate scenarios for the status ring, driver and hardware model.

#[cfg(test)]
mod multi_engine;

#[cfg(test)]
mod wraparound;

#[cfg(test)]
mod properties;
