//! Templates for the environment setup scripts shipped in the tarball.
//!
//! `setup.sh.in` and `setup.csh.in` carry the same variables in two shell
//! syntaxes. `@@OSG_LOCATION@@` is replaced by the post-install script once
//! the tarball's final location is known.

use std::path::{Path, PathBuf};

use crate::common::write_file_with_dirs;
use crate::error::Result;
use crate::target::{Basearch, Dver};

pub const LOCATION_PLACEHOLDER: &str = "@@OSG_LOCATION@@";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellFamily {
    Sh,
    Csh,
}

impl ShellFamily {
    pub const ALL: [ShellFamily; 2] = [ShellFamily::Csh, ShellFamily::Sh];

    pub fn name(&self) -> &'static str {
        match self {
            ShellFamily::Sh => "sh",
            ShellFamily::Csh => "csh",
        }
    }

    fn setenv(&self, var: &str, value: &str) -> String {
        match self {
            ShellFamily::Sh => format!("export {}=\"{}\"\n", var, value),
            ShellFamily::Csh => format!("setenv {} \"{}\"\n", var, value),
        }
    }

    fn unsetenv(&self, var: &str) -> String {
        match self {
            ShellFamily::Sh => format!("unset {}\n", var),
            ShellFamily::Csh => format!("unsetenv {}\n", var),
        }
    }

    fn ifdef(&self, var: &str) -> String {
        match self {
            ShellFamily::Sh => format!("if [ \"X\" != \"X${{{}-}}\" ]; then\n", var),
            ShellFamily::Csh => format!("if ($?{}) then\n", var),
        }
    }

    fn endif(&self) -> &'static str {
        match self {
            ShellFamily::Sh => "fi\n",
            ShellFamily::Csh => "endif\n",
        }
    }

    /// Prepend `$staging` to `var`, or set it outright when unset, then drop
    /// the staging variable.
    fn prepend(&self, var: &str, staging: &str, value: &str) -> String {
        let mut out = self.setenv(staging, value);
        out += &self.ifdef(var);
        out += "\t";
        out += &self.setenv(var, &format!("${{{}}}:${}", staging, var));
        out += "else\n\t";
        out += &self.setenv(var, &format!("${{{}}}", staging));
        out += self.endif();
        out += &self.unsetenv(staging);
        out
    }
}

fn library_path(basearch: Basearch) -> &'static str {
    if basearch.is_64bit() {
        "$OSG_LOCATION/usr/lib64:$OSG_LOCATION/usr/lib:$OSG_LOCATION/usr/lib64/dcap"
    } else {
        "$OSG_LOCATION/usr/lib:$OSG_LOCATION/usr/lib/dcap"
    }
}

fn perl_path(dver: Dver) -> &'static str {
    match dver {
        Dver::El6 => "$OSG_LOCATION/usr/share/perl5/vendor_perl:$OSG_LOCATION/usr/share/perl5",
        _ => "$OSG_LOCATION/usr/share/perl5/vendor_perl:$OSG_LOCATION/usr/share/perl5:$OSG_LOCATION/usr/lib64/perl5/vendor_perl",
    }
}

/// Render the setup template for one shell family.
pub fn render(shell: ShellFamily, dver: Dver, basearch: Basearch) -> String {
    let mut text = format!(
        "# Source this file if using {} or a shell derived from it\n",
        shell.name()
    );

    text += &shell.setenv("OSG_LOCATION", LOCATION_PLACEHOLDER);
    text += &shell.setenv("GLOBUS_LOCATION", "$OSG_LOCATION/usr");
    text += &shell.setenv("PATH", "$OSG_LOCATION/usr/bin:$OSG_LOCATION/usr/sbin:$PATH");
    text += "\n";

    text += &shell.prepend("LD_LIBRARY_PATH", "OSG_LD_LIBRARY_PATH", library_path(basearch));
    text += "\n";

    text += &shell.prepend("PERL5LIB", "OSG_PERL5LIB", perl_path(dver));
    text += "\n";

    text += &shell.setenv("X509_CERT_DIR", "$OSG_LOCATION/etc/grid-security/certificates");
    text += &shell.setenv("X509_VOMS_DIR", "$OSG_LOCATION/etc/grid-security/vomsdir");
    text += &shell.setenv("VOMS_USERCONF", "$OSG_LOCATION/etc/vomses");

    text += &shell.ifdef("MANPATH");
    text += "\t";
    text += &shell.setenv("MANPATH", "$OSG_LOCATION/usr/share/man:$MANPATH");
    text += "else\n\t";
    text += &shell.setenv("MANPATH", "$OSG_LOCATION/usr/share/man");
    text += shell.endif();
    text += "\n";
    text
}

/// Write `setup.csh.in` and `setup.sh.in` into `dest_dir`.
pub fn write_setup_in_files(dest_dir: &Path, dver: Dver, basearch: Basearch) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for shell in ShellFamily::ALL {
        let path = dest_dir.join(format!("setup.{}.in", shell.name()));
        write_file_with_dirs(&path, render(shell, dver, basearch))?;
        written.push(path);
    }
    Ok(written)
}
