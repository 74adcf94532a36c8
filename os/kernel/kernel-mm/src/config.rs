use crate::MemoryError;
use kernel_info::memory::is_page_aligned;
use kernel_info::region::{MemoryKind, RegionConfig};
use kernel_pool::IntegrityPolicy;

/// Startup parameters of a [`MemoryManager`](crate::MemoryManager).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    pub virtual_space: RegionConfig,
    pub physical_space: RegionConfig,
    /// Arena of the non-paged pool, if it is identity-addressable at startup.
    pub non_paged_pool: Option<RegionConfig>,
    /// Arena of the paged pool, if it is identity-addressable at startup.
    pub paged_pool: Option<RegionConfig>,
    pub pool_integrity: IntegrityPolicy,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            virtual_space: RegionConfig::default_virtual(),
            physical_space: RegionConfig::default_physical(),
            non_paged_pool: None,
            paged_pool: None,
            pool_integrity: IntegrityPolicy::default(),
        }
    }
}

impl MemoryConfig {
    /// Check that every region sits in the slot of its kind and that the
    /// address spaces are page aligned and non-empty.
    ///
    /// # Errors
    /// [`MemoryError::InvalidConfig`] naming the first bad slot.
    pub fn validate(&self) -> Result<(), MemoryError> {
        for (region, kind) in [
            (&self.virtual_space, MemoryKind::Virtual),
            (&self.physical_space, MemoryKind::Physical),
        ] {
            let aligned = is_page_aligned(region.area_start as u64)
                && is_page_aligned(region.area_size as u64);
            if region.kind != kind || !aligned || region.area_size == 0 || region.area_end().is_none()
            {
                return Err(MemoryError::InvalidConfig { kind });
            }
        }
        for (region, kind) in [
            (&self.non_paged_pool, MemoryKind::NonPagedPool),
            (&self.paged_pool, MemoryKind::PagedPool),
        ] {
            if let Some(region) = region
                && region.kind != kind
            {
                return Err(MemoryError::InvalidConfig { kind });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_valid() {
        assert_eq!(MemoryConfig::default().validate(), Ok(()));
    }

    #[test]
    fn swapped_slots_are_rejected() {
        let config = MemoryConfig {
            virtual_space: RegionConfig::default_physical(),
            ..MemoryConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(MemoryError::InvalidConfig {
                kind: MemoryKind::Virtual
            })
        );

        let config = MemoryConfig {
            paged_pool: Some(RegionConfig::default_pool(MemoryKind::NonPagedPool, 0x1000)),
            ..MemoryConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn misaligned_address_space_is_rejected() {
        let config = MemoryConfig {
            physical_space: RegionConfig::new(MemoryKind::Physical, 0x1234, 0x10_0000),
            ..MemoryConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(MemoryError::InvalidConfig {
                kind: MemoryKind::Physical
            })
        );
    }
}
