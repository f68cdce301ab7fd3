pub mod bond_carry;
pub mod primitives;
pub mod property;
