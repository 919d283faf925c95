//! GCN architecture model: generations, architecture masks and the GPU
//! device table the binary containers key their machine codes on.

use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};

pub mod decode;
pub mod encode;
pub mod regs;
pub mod table;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Mask of the GCN generations an instruction or register exists on
    pub struct ArchMask: u16 {
        /// GCN 1.0 (Southern Islands)
        const GCN10 = 1 << 0;
        /// GCN 1.1 (Sea Islands)
        const GCN11 = 1 << 1;
        /// GCN 1.2 (Volcanic Islands)
        const GCN12 = 1 << 2;
        /// GCN 1.4 (Vega)
        const GCN14 = 1 << 3;
        /// GCN 1.4.1 (Vega 20)
        const GCN141 = 1 << 4;
        /// GCN 1.5 (Navi)
        const GCN15 = 1 << 5;
        /// GCN 1.5.1 (Navi 14)
        const GCN151 = 1 << 6;
        /// Wave32 subvariant of GCN 1.5
        const GCN15_W32 = 1 << 7;
    }
}

impl ArchMask {
    /// Every generation
    pub const ALL: ArchMask = ArchMask::all();
    /// GCN 1.0 and 1.1
    pub const GCN1_01: ArchMask = ArchMask::GCN10.union(ArchMask::GCN11);
    /// GCN 1.2 through 1.4.1
    pub const GCN1_24: ArchMask = ArchMask::GCN12
        .union(ArchMask::GCN14)
        .union(ArchMask::GCN141);
    /// GCN 1.4 through 1.4.1
    pub const GCN1_4: ArchMask = ArchMask::GCN14.union(ArchMask::GCN141);
    /// All of GCN 1.5, both wave sizes
    pub const GCN1_5: ArchMask = ArchMask::GCN15
        .union(ArchMask::GCN151)
        .union(ArchMask::GCN15_W32);
    /// GCN 1.2 and everything after
    pub const GCN1_25: ArchMask = ArchMask::GCN1_24.union(ArchMask::GCN1_5);
    /// GCN 1.1 and everything after
    pub const GCN1_15: ArchMask = ArchMask::GCN11.union(ArchMask::GCN1_25);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// A GCN instruction-set generation
pub enum GcnGen {
    /// GCN 1.0 (Southern Islands)
    Gcn10,
    /// GCN 1.1 (Sea Islands)
    Gcn11,
    /// GCN 1.2 (Volcanic Islands)
    Gcn12,
    /// GCN 1.4 (Vega)
    Gcn14,
    /// GCN 1.4.1 (Vega 20)
    Gcn141,
    /// GCN 1.5 (Navi)
    Gcn15,
    /// GCN 1.5.1 (Navi 14)
    Gcn151,
}

impl GcnGen {
    /// The architecture-mask bit of this generation; wave32 selects the
    /// wave32 subvariant bit on GCN 1.5
    pub fn mask(self, wave32: bool) -> ArchMask {
        match self {
            GcnGen::Gcn10 => ArchMask::GCN10,
            GcnGen::Gcn11 => ArchMask::GCN11,
            GcnGen::Gcn12 => ArchMask::GCN12,
            GcnGen::Gcn14 => ArchMask::GCN14,
            GcnGen::Gcn141 => ArchMask::GCN141,
            GcnGen::Gcn15 | GcnGen::Gcn151 if wave32 => ArchMask::GCN15_W32,
            GcnGen::Gcn15 => ArchMask::GCN15,
            GcnGen::Gcn151 => ArchMask::GCN151,
        }
    }

    /// True from GCN 1.2 onward
    pub fn is_gcn12(self) -> bool {
        self >= GcnGen::Gcn12
    }

    /// True from GCN 1.4 onward
    pub fn is_gcn14(self) -> bool {
        self >= GcnGen::Gcn14
    }

    /// True from GCN 1.5 onward
    pub fn is_gcn15(self) -> bool {
        self >= GcnGen::Gcn15
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u32)]
/// GPU device types the containers name in their headers
pub enum GpuDeviceType {
    CapeVerde = 0,
    Pitcairn,
    Tahiti,
    Oland,
    Bonaire,
    Spectre,
    Spooky,
    Kalindi,
    Hainan,
    Hawaii,
    Iceland,
    Tonga,
    Mullins,
    Fiji,
    Carrizo,
    Dummy,
    Goose,
    Horse,
    Stoney,
    Ellesmere,
    Baffin,
    Gfx804,
    Gfx900,
    Gfx901,
    Gfx902,
    Gfx903,
    Gfx904,
    Gfx905,
    Gfx906,
    Gfx907,
    Gfx1000,
    Gfx1010,
    Gfx1011,
}

impl GpuDeviceType {
    /// Generation the device implements
    pub fn gen(self) -> GcnGen {
        use GpuDeviceType::*;
        match self {
            CapeVerde | Pitcairn | Tahiti | Oland | Hainan | Dummy => GcnGen::Gcn10,
            Bonaire | Spectre | Spooky | Kalindi | Hawaii | Mullins | Goose | Horse => {
                GcnGen::Gcn11
            }
            Iceland | Tonga | Fiji | Carrizo | Stoney | Ellesmere | Baffin | Gfx804 => {
                GcnGen::Gcn12
            }
            Gfx900 | Gfx901 | Gfx902 | Gfx903 | Gfx904 | Gfx905 => GcnGen::Gcn14,
            Gfx906 | Gfx907 => GcnGen::Gcn141,
            Gfx1000 | Gfx1010 => GcnGen::Gcn15,
            Gfx1011 => GcnGen::Gcn151,
        }
    }

    /// Lowercase device name used in listings and configuration
    pub fn name(self) -> &'static str {
        use GpuDeviceType::*;
        match self {
            CapeVerde => "capeverde",
            Pitcairn => "pitcairn",
            Tahiti => "tahiti",
            Oland => "oland",
            Bonaire => "bonaire",
            Spectre => "spectre",
            Spooky => "spooky",
            Kalindi => "kalindi",
            Hainan => "hainan",
            Hawaii => "hawaii",
            Iceland => "iceland",
            Tonga => "tonga",
            Mullins => "mullins",
            Fiji => "fiji",
            Carrizo => "carrizo",
            Dummy => "dummy",
            Goose => "goose",
            Horse => "horse",
            Stoney => "stoney",
            Ellesmere => "ellesmere",
            Baffin => "baffin",
            Gfx804 => "gfx804",
            Gfx900 => "gfx900",
            Gfx901 => "gfx901",
            Gfx902 => "gfx902",
            Gfx903 => "gfx903",
            Gfx904 => "gfx904",
            Gfx905 => "gfx905",
            Gfx906 => "gfx906",
            Gfx907 => "gfx907",
            Gfx1000 => "gfx1000",
            Gfx1010 => "gfx1010",
            Gfx1011 => "gfx1011",
        }
    }

    /// Maximum number of allocatable VGPRs per thread
    pub fn max_vgprs(self) -> u32 {
        256
    }

    /// Maximum number of allocatable SGPRs per wavefront
    pub fn max_sgprs(self) -> u32 {
        match self.gen() {
            GcnGen::Gcn10 | GcnGen::Gcn11 => 104,
            _ => 102,
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_gen_masks() {
        assert_eq!(GcnGen::Gcn10.mask(false), ArchMask::GCN10);
        assert_eq!(GcnGen::Gcn15.mask(false), ArchMask::GCN15);
        assert_eq!(GcnGen::Gcn15.mask(true), ArchMask::GCN15_W32);
        assert!(ArchMask::GCN1_25.contains(ArchMask::GCN141));
        assert!(!ArchMask::GCN1_01.contains(ArchMask::GCN12));
    }

    #[test]
    fn test_device_generations() {
        assert_eq!(GpuDeviceType::Pitcairn.gen(), GcnGen::Gcn10);
        assert_eq!(GpuDeviceType::Bonaire.gen(), GcnGen::Gcn11);
        assert_eq!(GpuDeviceType::Tonga.gen(), GcnGen::Gcn12);
        assert_eq!(GpuDeviceType::Gfx900.gen(), GcnGen::Gcn14);
        assert_eq!(GpuDeviceType::Gfx906.gen(), GcnGen::Gcn141);
        assert_eq!(GpuDeviceType::Gfx1010.gen(), GcnGen::Gcn15);
        assert!(GpuDeviceType::Gfx1010.gen().is_gcn15());
    }
}
