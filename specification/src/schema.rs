///
/// Macro that declares an EBML element table.
///
/// Each line names an element, its [`ElementKind`](crate::ElementKind), its id and (optionally) the path of
/// ancestors it lives under.  Global elements are marked with `@global`.  The macro produces a `#[repr(u64)]` enum
/// whose discriminants are the element ids, plus an [`EbmlSpecification`](crate::EbmlSpecification)
/// implementation backed by a static table.
///
/// ```
/// use ebml_tags_specification::{ebml_schema, EbmlSpecification, ElementKind};
///
/// ebml_schema! {
///     pub enum Example {
///         Root: Master = 0x1A45DFA3,
///         Count: UnsignedInt = 0x4286 in [Root],
///         Void: Binary = 0xEC @global,
///     }
/// }
///
/// assert_eq!(0x4286, Example::Count.id());
/// assert_eq!(Some(ElementKind::UnsignedInt), Example::get_kind(0x4286));
/// assert_eq!(&[0x1A45DFA3], Example::get_path(0x4286));
/// ```
///
#[macro_export]
macro_rules! ebml_schema {
    (@global) => { false };
    (@global global) => { true };

    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $variant:ident : $kind:ident = $id:literal $( in [ $( $parent:ident ),* ] )? $( @ $global:ident )?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(u64)]
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
        $vis enum $name {
            $( $variant = $id ),*
        }

        impl $name {
            const ELEMENTS: &'static [$crate::ElementSpec] = &[
                $(
                    $crate::ElementSpec {
                        id: $id,
                        name: stringify!($variant),
                        kind: $crate::ElementKind::$kind,
                        path: &[ $( $( $name::$parent as u64 ),* )? ],
                        global: $crate::ebml_schema!(@global $( $global )?),
                    }
                ),*
            ];

            pub const fn id(self) -> u64 {
                self as u64
            }

            pub fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => stringify!($variant), )*
                }
            }

            pub fn from_id(id: u64) -> Option<Self> {
                match id {
                    $( $id => Some($name::$variant), )*
                    _ => None,
                }
            }
        }

        impl $crate::EbmlSpecification for $name {
            fn get_element(id: u64) -> Option<&'static $crate::ElementSpec> {
                Self::ELEMENTS.iter().find(|element| element.id == id)
            }

            fn get_element_by_name(name: &str) -> Option<&'static $crate::ElementSpec> {
                Self::ELEMENTS.iter().find(|element| element.name == name)
            }
        }
    };
}
