/*!
 * Built-in drivers.
 */

pub mod test;

#[cfg(feature = "tcp")]
pub mod tcp;
