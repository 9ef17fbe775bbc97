//! Phase enum definition macro.

/// Defines a closed phase enumeration.
///
/// Each variant is paired with its wire name. The generated type has
/// `ALL`, `as_str()`, `Display`, serde support, and implements
/// [`crate::Phase`].
macro_rules! define_phase {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
            serde::Serialize, serde::Deserialize,
        )]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Every phase, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Returns the wire name of the phase.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self.as_str() {
                    "" => f.write_str("None"),
                    s => f.write_str(s),
                }
            }
        }

        impl crate::Phase for $name {
            const ALL: &'static [Self] = $name::ALL;
        }
    };
}

pub(crate) use define_phase;
