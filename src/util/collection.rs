// Copyright 2020 The stratadb Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

/// The default `HashMap` used in the crate
pub type HashMap<K, V> = hashbrown::HashMap<K, V>;

/// The default `HashSet` used in the crate
pub type HashSet<V> = hashbrown::HashSet<V>;
