// Transform helpers referenced as `babelHelpers.<name>` by lowered code.
// Only the helpers a bundle uses are emitted, each after its own dependencies.

use crate::utils::{KilnError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

pub const HELPERS_OBJECT: &str = "babelHelpers";

static HELPER_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bbabelHelpers\.([A-Za-z_$][A-Za-z0-9_$]*)").unwrap());

struct Helper {
    name: &'static str,
    deps: &'static [&'static str],
    body: &'static str,
}

const HELPERS: &[Helper] = &[
    Helper {
        name: "toPrimitive",
        deps: &[],
        body: r#"function (input, hint) {
  if (typeof input !== "object" || input === null) return input;
  var prim = input[Symbol.toPrimitive];
  if (prim !== undefined) {
    var res = prim.call(input, hint || "default");
    if (typeof res !== "object") return res;
    throw new TypeError("@@toPrimitive must return a primitive value.");
  }
  return (hint === "string" ? String : Number)(input);
}"#,
    },
    Helper {
        name: "toPropertyKey",
        deps: &["toPrimitive"],
        body: r#"function (arg) {
  var key = babelHelpers.toPrimitive(arg, "string");
  return typeof key === "symbol" ? key : String(key);
}"#,
    },
    Helper {
        name: "defineProperty",
        deps: &["toPropertyKey"],
        body: r#"function (obj, key, value) {
  key = babelHelpers.toPropertyKey(key);
  if (key in obj) {
    Object.defineProperty(obj, key, { value: value, enumerable: true, configurable: true, writable: true });
  } else {
    obj[key] = value;
  }
  return obj;
}"#,
    },
    Helper {
        name: "objectSpread2",
        deps: &["defineProperty"],
        body: r#"function (target) {
  for (var i = 1; i < arguments.length; i++) {
    var source = arguments[i] != null ? arguments[i] : {};
    var keys = Object.keys(source);
    if (typeof Object.getOwnPropertySymbols === "function") {
      keys = keys.concat(Object.getOwnPropertySymbols(source).filter(function (sym) {
        return Object.getOwnPropertyDescriptor(source, sym).enumerable;
      }));
    }
    keys.forEach(function (key) {
      babelHelpers.defineProperty(target, key, source[key]);
    });
  }
  return target;
}"#,
    },
    Helper {
        name: "extends",
        deps: &[],
        body: r#"function () {
  return Object.assign.apply(Object, arguments);
}"#,
    },
    Helper {
        name: "objectWithoutProperties",
        deps: &[],
        body: r#"function (source, excluded) {
  if (source == null) return {};
  var target = {};
  Object.keys(source).forEach(function (key) {
    if (excluded.indexOf(key) < 0) target[key] = source[key];
  });
  if (typeof Object.getOwnPropertySymbols === "function") {
    Object.getOwnPropertySymbols(source).forEach(function (key) {
      if (excluded.indexOf(key) < 0 && Object.prototype.propertyIsEnumerable.call(source, key)) {
        target[key] = source[key];
      }
    });
  }
  return target;
}"#,
    },
    Helper {
        name: "objectDestructuringEmpty",
        deps: &[],
        body: r#"function (obj) {
  if (obj == null) throw new TypeError("Cannot destructure " + obj);
}"#,
    },
    Helper {
        name: "asyncToGenerator",
        deps: &[],
        body: r#"function (fn) {
  return function () {
    var self = this, args = arguments;
    return new Promise(function (resolve, reject) {
      var gen = fn.apply(self, args);
      function step(key, arg) {
        var info;
        try {
          info = gen[key](arg);
        } catch (error) {
          reject(error);
          return;
        }
        if (info.done) {
          resolve(info.value);
        } else {
          Promise.resolve(info.value).then(next, fail);
        }
      }
      function next(value) { step("next", value); }
      function fail(error) { step("throw", error); }
      next(undefined);
    });
  };
}"#,
    },
    Helper {
        name: "checkPrivateRedeclaration",
        deps: &[],
        body: r#"function (obj, privateCollection) {
  if (privateCollection.has(obj)) {
    throw new TypeError("Cannot initialize the same private elements twice on an object");
  }
}"#,
    },
    Helper {
        name: "classPrivateFieldInitSpec",
        deps: &["checkPrivateRedeclaration"],
        body: r#"function (obj, privateMap, value) {
  babelHelpers.checkPrivateRedeclaration(obj, privateMap);
  privateMap.set(obj, value);
}"#,
    },
    Helper {
        name: "classPrivateMethodInitSpec",
        deps: &["checkPrivateRedeclaration"],
        body: r#"function (obj, privateSet) {
  babelHelpers.checkPrivateRedeclaration(obj, privateSet);
  privateSet.add(obj);
}"#,
    },
    Helper {
        name: "assertClassBrand",
        deps: &[],
        body: r#"function (brand, receiver, value) {
  if (typeof brand === "function" ? brand === receiver : brand.has(receiver)) {
    return arguments.length < 3 ? receiver : value;
  }
  throw new TypeError("Private element is not present on this object");
}"#,
    },
    Helper {
        name: "classPrivateFieldGet2",
        deps: &["assertClassBrand"],
        body: r#"function (privateMap, receiver) {
  return privateMap.get(babelHelpers.assertClassBrand(privateMap, receiver));
}"#,
    },
    Helper {
        name: "classPrivateFieldSet2",
        deps: &["assertClassBrand"],
        body: r#"function (privateMap, receiver, value) {
  privateMap.set(babelHelpers.assertClassBrand(privateMap, receiver), value);
  return value;
}"#,
    },
    Helper {
        name: "checkInRHS",
        deps: &[],
        body: r#"function (value) {
  if (Object(value) !== value) {
    throw new TypeError("right-hand side of 'in' should be an object, got " + (value !== null ? typeof value : "null"));
  }
  return value;
}"#,
    },
    Helper {
        name: "superPropGet",
        deps: &[],
        body: r#"function (classArg, property, receiver, flags) {
  var result = Reflect.get(Object.getPrototypeOf(flags & 1 ? classArg.prototype : classArg), property, receiver);
  return flags & 2 && typeof result === "function"
    ? function (args) { return result.apply(receiver, args); }
    : result;
}"#,
    },
    Helper {
        name: "superPropSet",
        deps: &[],
        body: r#"function (classArg, property, value, receiver, isStrict, prototype) {
  var done = Reflect.set(Object.getPrototypeOf(prototype ? classArg.prototype : classArg), property, value, receiver);
  if (!done && isStrict) throw new TypeError("failed to set property");
  return value;
}"#,
    },
    Helper {
        name: "toSetter",
        deps: &[],
        body: r#"function (fn, args, thisArg) {
  args || (args = []);
  var index = args.length++;
  return Object.defineProperty({}, "_", {
    set: function (value) {
      args[index] = value;
      fn.apply(thisArg, args);
    }
  });
}"#,
    },
    Helper {
        name: "readOnlyError",
        deps: &[],
        body: r#"function (name) {
  throw new TypeError('"' + name + '" is read-only');
}"#,
    },
    Helper {
        name: "writeOnlyError",
        deps: &[],
        body: r#"function (name) {
  throw new TypeError('"' + name + '" is write-only');
}"#,
    },
];

/// Helper names referenced by a compiled module.
pub fn referenced_helpers(code: &str) -> BTreeSet<String> {
    HELPER_REFERENCE
        .captures_iter(code)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Definitions for `used`, dependencies first. Unknown helpers are a build error.
pub fn render_helpers(used: &BTreeSet<String>) -> Result<String> {
    if used.is_empty() {
        return Ok(String::new());
    }

    let mut ordered: Vec<&'static Helper> = Vec::new();
    for name in used {
        push_with_deps(name, &mut ordered)?;
    }

    let mut out = format!("var {} = {{}};\n", HELPERS_OBJECT);
    for helper in ordered {
        out.push_str(&format!("{}.{} = {};\n", HELPERS_OBJECT, helper.name, helper.body));
    }
    Ok(out)
}

fn push_with_deps(name: &str, ordered: &mut Vec<&'static Helper>) -> Result<()> {
    if ordered.iter().any(|h| h.name == name) {
        return Ok(());
    }

    let helper = HELPERS.iter().find(|h| h.name == name).ok_or_else(|| {
        KilnError::build(format!(
            "Lowering needs the '{}' helper, which kiln does not provide; raise the target in kiln.config.json",
            name
        ))
    })?;

    for dep in helper.deps {
        push_with_deps(dep, ordered)?;
    }
    ordered.push(helper);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_referenced_helpers() {
        let code = "babelHelpers.defineProperty(this, \"hp\", 100);\nvar o = babelHelpers.objectSpread2({}, a);\n";
        assert_eq!(referenced_helpers(code), names(&["defineProperty", "objectSpread2"]));
    }

    #[test]
    fn test_dependencies_come_first() {
        let rendered = render_helpers(&names(&["objectSpread2"])).unwrap();

        let primitive = rendered.find("babelHelpers.toPrimitive =").unwrap();
        let key = rendered.find("babelHelpers.toPropertyKey =").unwrap();
        let define = rendered.find("babelHelpers.defineProperty =").unwrap();
        let spread = rendered.find("babelHelpers.objectSpread2 =").unwrap();

        assert!(rendered.starts_with("var babelHelpers = {};"));
        assert!(primitive < key && key < define && define < spread);
        assert_eq!(rendered.matches("babelHelpers.toPrimitive =").count(), 1);
    }

    #[test]
    fn test_no_helpers_renders_nothing() {
        assert_eq!(render_helpers(&BTreeSet::new()).unwrap(), "");
    }

    #[test]
    fn test_unknown_helper_is_build_error() {
        let err = render_helpers(&names(&["usingCtx"])).unwrap_err();
        assert!(matches!(err, KilnError::Build { .. }));
        assert!(err.to_string().contains("usingCtx"));
    }
}
