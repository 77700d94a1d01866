//! Shell options toggled by command-line flags and the `set` builtin.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShellOptions {
    /// `-e`: exit on the first unchecked failure.
    pub errexit: bool,
    /// `-n`: parse commands without running them.
    pub noexec: bool,
    /// `-u`: expanding an unset variable is an error.
    pub nounset: bool,
    /// `-f`: no pathname expansion.
    pub noglob: bool,
    /// `-x`: trace commands to stderr.
    pub xtrace: bool,
}

impl ShellOptions {
    /// Apply a single option letter. Returns false for unknown letters.
    pub fn set_flag(&mut self, flag: char, on: bool) -> bool {
        let slot = match flag {
            'e' => &mut self.errexit,
            'n' => &mut self.noexec,
            'u' => &mut self.nounset,
            'f' => &mut self.noglob,
            'x' => &mut self.xtrace,
            _ => return false,
        };
        *slot = on;
        true
    }

    /// Long names accepted by `set -o` / `set +o`.
    pub fn set_named(&mut self, name: &str, on: bool) -> bool {
        match Self::letter_for(name) {
            Some(flag) => self.set_flag(flag, on),
            None => false,
        }
    }

    fn letter_for(name: &str) -> Option<char> {
        match name {
            "errexit" => Some('e'),
            "noexec" => Some('n'),
            "nounset" => Some('u'),
            "noglob" => Some('f'),
            "xtrace" => Some('x'),
            _ => None,
        }
    }

    /// Value of `$-`.
    pub fn flags(&self, interactive: bool) -> String {
        let mut out = String::new();
        for (flag, on) in [
            ('e', self.errexit),
            ('f', self.noglob),
            ('i', interactive),
            ('n', self.noexec),
            ('u', self.nounset),
            ('x', self.xtrace),
        ] {
            if on {
                out.push(flag);
            }
        }
        out
    }

    /// Lines printed by `set -o`.
    pub fn describe(&self) -> Vec<String> {
        [
            ("errexit", self.errexit),
            ("noexec", self.noexec),
            ("noglob", self.noglob),
            ("nounset", self.nounset),
            ("xtrace", self.xtrace),
        ]
        .iter()
        .map(|(name, on)| format!("{:<12}{}", name, if *on { "on" } else { "off" }))
        .collect()
    }
}
