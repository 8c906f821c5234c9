//! Colour description (ITU-T H.273).
//!
//! The same code points are carried by the H.264/HEVC VUI, the ISO-BMFF `colr`
//! box and the Matroska `Colour` element, so they live here rather than in a
//! codec or container crate. Names follow the WebCodecs `VideoColorSpace`
//! vocabulary where one exists.

use serde::{Serialize, Serializer};

macro_rules! h273_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal => $label:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// Code point without a known name
            Unknown(u8),
        }

        impl From<u8> for $name {
            fn from(value: u8) -> Self {
                match value {
                    $( $code => Self::$variant, )+
                    v => Self::Unknown(v),
                }
            }
        }

        impl $name {
            /// The H.273 code point.
            pub fn code(&self) -> u8 {
                match self {
                    $( Self::$variant => $code, )+
                    Self::Unknown(v) => *v,
                }
            }

            /// WebCodecs-style name, `None` for unnamed code points.
            pub fn as_str(&self) -> Option<&'static str> {
                match self {
                    $( Self::$variant => Some($label), )+
                    Self::Unknown(_) => None,
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                match self.as_str() {
                    Some(label) => serializer.serialize_str(label),
                    None => serializer.serialize_u8(self.code()),
                }
            }
        }
    };
}

h273_enum! {
    /// Colour primaries
    ColorPrimaries {
        /// BT.709
        Bt709 = 1 => "bt709",
        /// Unspecified
        Unspecified = 2 => "unspecified",
        /// BT.470M
        Bt470M = 4 => "bt470m",
        /// BT.470BG
        Bt470Bg = 5 => "bt470bg",
        /// SMPTE 170M
        Smpte170M = 6 => "smpte170m",
        /// SMPTE 240M
        Smpte240M = 7 => "smpte240m",
        /// Generic film
        Film = 8 => "film",
        /// BT.2020
        Bt2020 = 9 => "bt2020",
        /// SMPTE ST 428-1
        Smpte428 = 10 => "smpte428",
        /// SMPTE RP 431-2 (DCI-P3)
        SmpteRp431 = 11 => "smpte431",
        /// SMPTE EG 432-1 (Display P3)
        SmpteEg432 = 12 => "smpte432",
        /// EBU Tech 3213-E
        Ebu3213 = 22 => "ebu3213",
    }
}

h273_enum! {
    /// Transfer characteristics
    TransferCharacteristics {
        /// BT.709
        Bt709 = 1 => "bt709",
        /// Unspecified
        Unspecified = 2 => "unspecified",
        /// BT.470M
        Bt470M = 4 => "bt470m",
        /// BT.470BG
        Bt470Bg = 5 => "bt470bg",
        /// SMPTE 170M
        Smpte170M = 6 => "smpte170m",
        /// SMPTE 240M
        Smpte240M = 7 => "smpte240m",
        /// Linear
        Linear = 8 => "linear",
        /// Logarithmic (100:1)
        Log100 = 9 => "log",
        /// Logarithmic (100*sqrt(10):1)
        Log316 = 10 => "log-sqrt",
        /// IEC 61966-2-4
        Iec61966_2_4 = 11 => "iec61966-2-4",
        /// BT.1361 extended
        Bt1361E = 12 => "bt1361e",
        /// IEC 61966-2-1 (sRGB)
        Iec61966_2_1 = 13 => "iec61966-2-1",
        /// BT.2020 10-bit
        Bt2020_10 = 14 => "bt2020-10",
        /// BT.2020 12-bit
        Bt2020_12 = 15 => "bt2020-12",
        /// SMPTE ST 2084 (PQ)
        SmpteSt2084 = 16 => "pq",
        /// SMPTE ST 428-1
        SmpteSt428 = 17 => "smpte428",
        /// ARIB STD-B67 (HLG)
        AribStdB67 = 18 => "hlg",
    }
}

h273_enum! {
    /// Matrix coefficients
    MatrixCoefficients {
        /// Identity (RGB)
        Identity = 0 => "rgb",
        /// BT.709
        Bt709 = 1 => "bt709",
        /// Unspecified
        Unspecified = 2 => "unspecified",
        /// FCC
        Fcc = 4 => "fcc",
        /// BT.470BG
        Bt470Bg = 5 => "bt470bg",
        /// SMPTE 170M
        Smpte170M = 6 => "smpte170m",
        /// SMPTE 240M
        Smpte240M = 7 => "smpte240m",
        /// YCgCo
        YCgCo = 8 => "ycgco",
        /// BT.2020 non-constant luminance
        Bt2020Ncl = 9 => "bt2020-ncl",
        /// BT.2020 constant luminance
        Bt2020Cl = 10 => "bt2020-cl",
        /// SMPTE ST 2085
        SmpteSt2085 = 11 => "smpte2085",
        /// Chromaticity-derived non-constant luminance
        ChromaNcl = 12 => "chroma-derived-ncl",
        /// Chromaticity-derived constant luminance
        ChromaCl = 13 => "chroma-derived-cl",
        /// ICtCp
        ICtCp = 14 => "ictcp",
    }
}

impl TransferCharacteristics {
    /// Returns true for the PQ and HLG transfer functions.
    pub fn is_hdr(&self) -> bool {
        matches!(self, Self::SmpteSt2084 | Self::AribStdB67)
    }
}

/// Colour description of a video track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoColor {
    pub primaries: ColorPrimaries,
    pub transfer_characteristics: TransferCharacteristics,
    pub matrix_coefficients: MatrixCoefficients,
    /// Full range (0-255) rather than limited range (16-235).
    pub full_range: bool,
}

impl VideoColor {
    /// Build from raw H.273 code points.
    pub fn from_codes(primaries: u8, transfer: u8, matrix: u8, full_range: bool) -> Self {
        Self {
            primaries: primaries.into(),
            transfer_characteristics: transfer.into(),
            matrix_coefficients: matrix.into(),
            full_range,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_points_roundtrip() {
        assert_eq!(ColorPrimaries::from(9), ColorPrimaries::Bt2020);
        assert_eq!(ColorPrimaries::Bt2020.code(), 9);
        assert_eq!(TransferCharacteristics::from(16), TransferCharacteristics::SmpteSt2084);
        assert_eq!(MatrixCoefficients::from(0), MatrixCoefficients::Identity);
        assert_eq!(MatrixCoefficients::from(200), MatrixCoefficients::Unknown(200));
        assert_eq!(MatrixCoefficients::Unknown(200).code(), 200);
    }

    #[test]
    fn test_hdr_transfer() {
        assert!(TransferCharacteristics::AribStdB67.is_hdr());
        assert!(!TransferCharacteristics::Bt709.is_hdr());
    }

    #[test]
    fn test_serializes_webcodecs_names() {
        let color = VideoColor::from_codes(1, 13, 6, false);
        let json = serde_json::to_value(color).unwrap();
        assert_eq!(json["primaries"], "bt709");
        assert_eq!(json["transfer_characteristics"], "iec61966-2-1");
        assert_eq!(json["matrix_coefficients"], "smpte170m");
        assert_eq!(json["full_range"], false);

        let unknown = serde_json::to_value(ColorPrimaries::Unknown(99)).unwrap();
        assert_eq!(unknown, 99);
    }
}
