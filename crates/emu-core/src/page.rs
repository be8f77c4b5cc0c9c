//! Page-granular access table.
//!
//! The host system decodes the 16-bit address space in 64-byte pages. A
//! device claims the pages it wants to see; every access to a claimed page
//! is routed to that device.

/// log2 of the page size.
pub const PAGE_SHIFT: u16 = 6;

/// Bytes per page.
pub const PAGE_SIZE: u16 = 1 << PAGE_SHIFT;

/// Number of pages covering the 16-bit address space.
pub const NUM_PAGES: usize = 1 << (16 - PAGE_SHIFT);

/// What a claiming device wants to intercept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAccessType {
    Read,
    Write,
    ReadWrite,
}

/// One page's routing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageAccess {
    /// Name of the owning device.
    pub device: &'static str,
    pub access: PageAccessType,
}

/// The host's memory-access table, as seen by an installing device.
pub trait System {
    /// Route the page containing `address` according to `access`.
    fn set_page_access(&mut self, address: u16, access: PageAccess);

    /// Current routing for the page containing `address`.
    fn page_access(&self, address: u16) -> Option<PageAccess>;
}

/// Flat page table covering the whole 16-bit space.
pub struct PageTable {
    pages: Vec<Option<PageAccess>>,
}

impl PageTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pages: vec![None; NUM_PAGES],
        }
    }

    /// Page index for an address.
    #[must_use]
    pub const fn page_of(address: u16) -> usize {
        (address >> PAGE_SHIFT) as usize
    }

    /// Number of pages currently owned by `device`.
    #[must_use]
    pub fn pages_owned_by(&self, device: &str) -> usize {
        self.pages
            .iter()
            .filter(|p| p.is_some_and(|a| a.device == device))
            .count()
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

impl System for PageTable {
    fn set_page_access(&mut self, address: u16, access: PageAccess) {
        self.pages[Self::page_of(address)] = Some(access);
    }

    fn page_access(&self, address: u16) -> Option<PageAccess> {
        self.pages[Self::page_of(address)]
    }
}
