#[macro_export]
macro_rules! dummy {
    ($t:expr) => {
        ()
    };
}

/// Declares an enum over a group of identically laid out register sets
/// (buffers, filters, masks), each starting at a `SIDH` register.
#[macro_export]
macro_rules! register_set {
    (
        $(#[doc = $doc:expr])*
        $name:ident => {
            $(
                $(#[doc = $set_doc:expr])*
                $set:ident => $sidh:expr
            ),*
        }
    ) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
        pub enum $name {
            $(
                $(#[doc = $set_doc])*
                $set,
            )*
        }

        impl $name {
            #[doc = concat!("All valid options for [`", stringify!($name), "`].")]
            pub const ALL: [Self; <[_]>::len(&[$($crate::dummy!($set)),*])] = [$(Self::$set),*];

            /// Returns the `SIDH` register, the first of the `SIDH`, `SIDL`,
            /// `EID8`, `EID0` block.
            pub const fn sidh(self) -> $crate::regs::Register {
                match self {
                    $(Self::$set => $sidh,)*
                }
            }
        }
    };
}
