// cvar.rs -- console variable registry used for server tunables

use crate::common::{com_dprintf, com_printf};
use crate::q_shared::{CVAR_NOSET, CVAR_SERVERINFO};

use std::collections::HashMap;

/// A console variable.
#[derive(Clone, Debug)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub description: &'static str,
    pub flags: i32,
    pub modified: bool,
    pub value: f32,
}

/// Static description of a cvar, registered once at startup.
#[derive(Clone, Copy, Debug)]
pub struct CvarDef {
    pub name: &'static str,
    pub default: &'static str,
    pub flags: i32,
    pub description: &'static str,
}

/// The cvar registry. Owned by the server context, no global instance.
#[derive(Default)]
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    /// O(1) cvar lookup by name -> index in cvar_vars
    cvar_index: HashMap<String, usize>,
}

fn parse_value(s: &str) -> f32 {
    s.trim().parse::<f32>().unwrap_or(0.0)
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.cvar_index.get(name).map(|&idx| &self.cvar_vars[idx])
    }

    /// Get the floating-point value of a cvar. Returns 0 if not found.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map_or(0.0, |var| var.value)
    }

    /// Get the floating-point value of a cvar, or `fallback` if it was never registered.
    pub fn value_or(&self, name: &str, fallback: f32) -> f32 {
        self.find_var(name).map_or(fallback, |var| var.value)
    }

    /// Get or create a cvar. If it already exists, the value is not changed
    /// but flags are OR'd in.
    pub fn get(&mut self, name: &str, value: &str, flags: i32) -> usize {
        if let Some(&idx) = self.cvar_index.get(name) {
            self.cvar_vars[idx].flags |= flags;
            return idx;
        }

        let idx = self.cvar_vars.len();
        self.cvar_vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            description: "",
            flags,
            modified: true,
            value: parse_value(value),
        });
        self.cvar_index.insert(name.to_string(), idx);
        idx
    }

    /// Register a set of cvar definitions. Existing values are kept.
    pub fn register(&mut self, defs: &[CvarDef]) {
        for def in defs {
            let idx = self.get(def.name, def.default, def.flags);
            let var = &mut self.cvar_vars[idx];
            var.description = def.description;
        }
    }

    fn set2(&mut self, name: &str, value: &str, force: bool) -> usize {
        let idx = match self.cvar_index.get(name).copied() {
            Some(idx) => idx,
            None => return self.get(name, value, 0),
        };

        let var = &mut self.cvar_vars[idx];
        if !force && var.flags & CVAR_NOSET != 0 {
            com_printf(&format!("{} is write protected.\n", name));
            return idx;
        }

        if value == var.string {
            return idx; // not changed
        }

        if var.flags & CVAR_SERVERINFO != 0 {
            com_dprintf(&format!("serverinfo \"{}\" changed to \"{}\"\n", name, value));
        }

        var.modified = true;
        var.string = value.to_string();
        var.value = parse_value(value);
        idx
    }

    /// Set a cvar value (respects NOSET).
    pub fn set(&mut self, name: &str, value: &str) -> usize {
        self.set2(name, value, false)
    }

    /// Force-set a cvar value (ignores NOSET).
    pub fn force_set(&mut self, name: &str, value: &str) -> usize {
        self.set2(name, value, true)
    }

    /// Collect and clear the modified bit of every cvar whose name starts with `prefix`.
    pub fn take_modified(&mut self, prefix: &str) -> Vec<String> {
        let mut names = Vec::new();
        for var in &mut self.cvar_vars {
            if var.modified && var.name.starts_with(prefix) {
                var.modified = false;
                names.push(var.name.clone());
            }
        }
        names
    }

    /// Print cvars whose name starts with `prefix` (all if empty).
    /// Returns (total, matching).
    pub fn list(&self, prefix: &str) -> (usize, usize) {
        let mut matching = 0;

        for var in &self.cvar_vars {
            if !var.name.starts_with(prefix) {
                continue;
            }
            matching += 1;
            let serverinfo = if var.flags & CVAR_SERVERINFO != 0 { 'S' } else { ' ' };
            let noset = if var.flags & CVAR_NOSET != 0 { '-' } else { ' ' };
            com_printf(&format!(
                "{}{} {} \"{}\" - {}\n",
                serverinfo, noset, var.name, var.string, var.description
            ));
        }

        com_printf(&format!("{} cvars, {} matching\n", self.cvar_vars.len(), matching));
        (self.cvar_vars.len(), matching)
    }
}

// ============================================================
// Tests
// ============================================================
