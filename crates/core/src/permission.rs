use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bit-flag access rights carried by a user account. Stored and transmitted
/// as the raw numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permission(u8);

impl Permission {
    pub const NONE: Permission = Permission(0);
    pub const READ: Permission = Permission(1);
    pub const WRITE: Permission = Permission(1 << 1);
    pub const DELETE: Permission = Permission(1 << 2);
    pub const ROOT: Permission = Permission(1 | 1 << 1 | 1 << 2);

    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Undefined bits are dropped.
    pub fn from_bits(bits: u8) -> Permission {
        Permission(bits & Permission::ROOT.0)
    }

    /// True when every bit of `required` is present.
    pub fn contains(&self, required: Permission) -> bool {
        self.0 & required.0 == required.0
    }
}

impl BitOr for Permission {
    type Output = Permission;

    fn bitor(self, rhs: Permission) -> Permission {
        Permission(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permission {
    fn bitor_assign(&mut self, rhs: Permission) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_the_union_of_all_rights() {
        assert_eq!(
            Permission::READ | Permission::WRITE | Permission::DELETE,
            Permission::ROOT
        );
        assert!(Permission::ROOT.contains(Permission::READ));
        assert!(Permission::ROOT.contains(Permission::WRITE | Permission::DELETE));
    }

    #[test]
    fn contains_requires_every_bit() {
        let rw = Permission::READ | Permission::WRITE;
        assert!(rw.contains(Permission::READ));
        assert!(rw.contains(rw));
        assert!(!rw.contains(Permission::DELETE));
        assert!(!rw.contains(Permission::ROOT));
        assert!(!Permission::NONE.contains(Permission::READ));
    }

    #[test]
    fn from_bits_masks_undefined_bits() {
        assert_eq!(Permission::from_bits(0xFF), Permission::ROOT);
        assert_eq!(Permission::from_bits(0), Permission::NONE);
        assert_eq!(Permission::from_bits(5).bits(), 5);
    }
}
