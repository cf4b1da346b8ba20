#[macro_export]
macro_rules! define_interface {
    (command {$($variant:ident => $name:literal),*,}) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Command {
            $($variant),*
        }

        impl Command {
            pub fn to_str(&self) -> &'static str {
                match self {
                    $(Command::$variant => $name),*
                }
            }
        }

        impl core::fmt::Display for Command {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.to_str())
            }
        }
    };
}
